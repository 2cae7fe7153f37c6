//! File storage for uploads and generated audio
//!
//! Layout under the configured root:
//! - `uploads/{doc_id}_{file_name}`
//! - `podcasts/{podcast_id}.wav`
//!
//! Files are addressed by their path relative to the root and published as
//! `{base_url}/storage/{relative_path}`.

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

pub const UPLOADS_DIR: &str = "uploads";
pub const PODCASTS_DIR: &str = "podcasts";

/// A file written to storage
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub relative_path: String,
    pub url: String,
    pub size_bytes: u64,
    /// SHA-256 of the content, hex encoded
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    base_url: String,
}

impl FileStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create the storage directories if missing
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.root.join(UPLOADS_DIR)).await?;
        tokio::fs::create_dir_all(self.root.join(PODCASTS_DIR)).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL of a stored file
    pub fn url_for(&self, relative_path: &str) -> String {
        format!("{}/storage/{}", self.base_url, relative_path.trim_start_matches('/'))
    }

    /// Resolve a relative path under the root, rejecting traversal
    pub fn absolute_path(&self, relative_path: &str) -> Result<PathBuf> {
        let relative = Path::new(relative_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(AppError::Storage {
                message: format!("Invalid storage path: {}", relative_path),
            });
        }
        Ok(self.root.join(relative))
    }

    /// Store an uploaded document
    pub async fn save_upload(&self, doc_id: &str, file_name: &str, bytes: &[u8]) -> Result<StoredFile> {
        let relative_path = format!("{}/{}_{}", UPLOADS_DIR, doc_id, sanitize_file_name(file_name));
        self.write(&relative_path, bytes).await
    }

    /// Relative path of a podcast's audio file
    pub fn podcast_path(&self, podcast_id: &str) -> String {
        format!("{}/{}.wav", PODCASTS_DIR, podcast_id)
    }

    /// Store podcast audio
    pub async fn save_podcast(&self, podcast_id: &str, bytes: &[u8]) -> Result<StoredFile> {
        let relative_path = self.podcast_path(podcast_id);
        self.write(&relative_path, bytes).await
    }

    async fn write(&self, relative_path: &str, bytes: &[u8]) -> Result<StoredFile> {
        let path = self.absolute_path(relative_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "File stored");

        Ok(StoredFile {
            relative_path: relative_path.to_string(),
            url: self.url_for(relative_path),
            size_bytes: bytes.len() as u64,
            content_hash: hex::encode(Sha256::digest(bytes)),
        })
    }

    /// Delete a stored file; a missing file is not an error
    pub async fn delete(&self, relative_path: &str) -> Result<()> {
        let path = self.absolute_path(relative_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort delete used during cascades
    pub async fn delete_quietly(&self, relative_path: &str) {
        if let Err(e) = self.delete(relative_path).await {
            tracing::warn!(path = relative_path, error = %e, "Failed to delete stored file");
        }
    }
}

/// Keep ASCII alphanumerics, `.`, `-` and `_`; replace everything else
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
