//! DocMind document ingestion
//!
//! PDF layout extraction, outline building, section chunking and the upload
//! pipeline that ties them to storage and the database.

pub mod chunker;
pub mod errors;
pub mod outline;
pub mod pdf;
pub mod processor;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use chunker::{chunk_text, ChunkingConfig, TextChunk};
pub use errors::IngestionError;
pub use outline::{extract_document, ExtractedDocument, OutlineEntry};
pub use processor::{DocumentProcessor, UploadFailure, UploadOutcome, UploadTarget, UploadedFile};
