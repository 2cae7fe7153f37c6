//! Ingestion error types

use docmind_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error for {file}: {message}")]
    PdfParse { file: String, message: String },

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Extraction task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::PdfParse { file, message } => AppError::ExtractionFailed { file, message },
            IngestionError::Io(err) => AppError::Storage {
                message: err.to_string(),
            },
            other => AppError::Internal {
                message: other.to_string(),
            },
        }
    }
}
