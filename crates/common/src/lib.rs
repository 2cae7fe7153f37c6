//! DocMind Common Library
//!
//! Shared code for all DocMind crates including:
//! - Database models and repository patterns
//! - Embedding, language model and speech provider abstractions
//! - File storage for uploads and generated audio
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod ids;
pub mod llm;
pub mod metrics;
pub mod speech;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::LanguageModel;
pub use speech::SpeechSynthesizer;
pub use storage::FileStorage;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
