//! Configuration management for DocMind services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Provider settings (LLM, speech, embedding) are read once here and handed
//! to the provider factories; nothing downstream reads the environment.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// File storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingSettings,

    /// Recommendation ranking and retention
    #[serde(default)]
    pub recommendation: RecommendationConfig,

    /// Podcast script and audio settings
    #[serde(default)]
    pub podcast: PodcastConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (postgres:// or sqlite:)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for uploads and generated artifacts
    #[serde(default = "default_storage_path")]
    pub root: String,

    /// Public base URL used to build file links
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai, azure, gemini, ollama, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model (or Azure deployment name)
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key (unused for ollama and mock)
    pub api_key: Option<String>,

    /// Base URL override
    pub base_url: Option<String>,

    /// Azure API version
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Total time budget for retries in seconds
    #[serde(default = "default_llm_retry_budget")]
    pub retry_budget_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechConfig {
    /// Provider: openai, azure, local
    #[serde(default = "default_speech_provider")]
    pub provider: String,

    /// API key
    pub api_key: Option<String>,

    /// Endpoint override (required for azure)
    pub endpoint: Option<String>,

    /// TTS model (openai) or deployment (azure)
    #[serde(default = "default_speech_model")]
    pub model: String,

    /// Azure API version
    #[serde(default = "default_speech_api_version")]
    pub api_version: String,

    /// Voice used for the HOST speaker
    #[serde(default = "default_host_voice")]
    pub host_voice: String,

    /// Voice used for the GUEST speaker
    #[serde(default = "default_guest_voice")]
    pub guest_voice: String,

    /// Maximum characters per synthesis request
    #[serde(default = "default_speech_max_chars")]
    pub max_chars: usize,

    /// Request timeout in seconds
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingSettings {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Chunks shorter than this are dropped unless they are the only one
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendationConfig {
    /// Items returned per recommendation
    #[serde(default = "default_num_results")]
    pub num_results: usize,

    /// Candidate over-fetch factor for text selections
    #[serde(default = "default_selection_multiplier")]
    pub selection_multiplier: usize,

    /// Candidate over-fetch factor for persona queries
    #[serde(default = "default_persona_multiplier")]
    pub persona_multiplier: usize,

    /// Cosine above which two items count as duplicates
    #[serde(default = "default_duplicate_similarity")]
    pub duplicate_similarity: f32,

    /// Cosine above which a candidate repeats the selection
    #[serde(default = "default_selection_similarity")]
    pub selection_similarity: f32,

    /// Generate an LLM explanation per item
    #[serde(default = "default_enabled")]
    pub explain: bool,

    /// Hours a recommendation stays retrievable
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Stored recommendations kept per collection
    #[serde(default = "default_max_per_collection")]
    pub max_per_collection: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PodcastConfig {
    /// Speaking rate used to turn durations into word targets
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,

    /// Silence inserted between speaker turns
    #[serde(default = "default_pause_millis")]
    pub pause_millis: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Generation requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 300 }
fn default_max_upload_bytes() -> usize { 50 * 1024 * 1024 }
fn default_database_url() -> String { "postgres://localhost/docmind".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_storage_path() -> String { "storage".to_string() }
fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_embedding_provider() -> String { "hashing".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 384 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 64 }
fn default_llm_provider() -> String { "mock".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_azure_api_version() -> String { "2024-02-15-preview".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 4096 }
fn default_llm_timeout() -> u64 { 30 }
fn default_llm_retry_budget() -> u64 { 60 }
fn default_speech_provider() -> String { "local".to_string() }
fn default_speech_model() -> String { "tts-1".to_string() }
fn default_speech_api_version() -> String { "2025-03-01-preview".to_string() }
fn default_host_voice() -> String { "alloy".to_string() }
fn default_guest_voice() -> String { "onyx".to_string() }
fn default_speech_max_chars() -> usize { 3000 }
fn default_speech_timeout() -> u64 { 60 }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 200 }
fn default_min_chunk_size() -> usize { 40 }
fn default_num_results() -> usize { 5 }
fn default_selection_multiplier() -> usize { 3 }
fn default_persona_multiplier() -> usize { 2 }
fn default_duplicate_similarity() -> f32 { 0.75 }
fn default_selection_similarity() -> f32 { 0.85 }
fn default_retention_hours() -> u64 { 168 }
fn default_max_per_collection() -> u64 { 50 }
fn default_words_per_minute() -> u32 { 150 }
fn default_pause_millis() -> u32 { 350 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "docmind".to_string() }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 10 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__LLM__PROVIDER=gemini
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Recommendation retention window
    pub fn recommendation_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recommendation.retention_hours as i64)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_path(),
            base_url: default_base_url(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            api_version: default_azure_api_version(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            retry_budget_secs: default_llm_retry_budget(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: default_speech_provider(),
            api_key: None,
            endpoint: None,
            model: default_speech_model(),
            api_version: default_speech_api_version(),
            host_voice: default_host_voice(),
            guest_voice: default_guest_voice(),
            max_chars: default_speech_max_chars(),
            timeout_secs: default_speech_timeout(),
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            num_results: default_num_results(),
            selection_multiplier: default_selection_multiplier(),
            persona_multiplier: default_persona_multiplier(),
            duplicate_similarity: default_duplicate_similarity(),
            selection_similarity: default_selection_similarity(),
            explain: default_enabled(),
            retention_hours: default_retention_hours(),
            max_per_collection: default_max_per_collection(),
        }
    }
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            words_per_minute: default_words_per_minute(),
            pause_millis: default_pause_millis(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            speech: SpeechConfig::default(),
            chunking: ChunkingSettings::default(),
            recommendation: RecommendationConfig::default(),
            podcast: PodcastConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
