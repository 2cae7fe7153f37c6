//! Document processor
//!
//! Runs the upload pipeline for a batch of files:
//! 1. store the bytes under `uploads/`
//! 2. create the document row (`pending`)
//! 3. extract text and outline on the blocking pool
//! 4. persist the outline, or record the extraction failure
//!
//! A file that cannot be stored is reported as a failure; a file that cannot
//! be parsed still becomes a document with `is_processed = failed`.

use crate::errors::IngestionError;
use crate::outline::{extract_document, ExtractedDocument};
use docmind_common::db::models::{Collection, Document};
use docmind_common::db::{NewDocument, NewOutlineItem, Removed, Repository};
use docmind_common::errors::{AppError, Result};
use docmind_common::ids;
use docmind_common::metrics;
use docmind_common::storage::FileStorage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_COLLECTION_NAME: &str = "Default Uploads";
const DEFAULT_COLLECTION_DESCRIPTION: &str = "Documents uploaded without a collection";
const PDF_MIME: &str = "application/pdf";

/// A file received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A file that never became a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFailure {
    pub file_name: String,
    pub error: String,
}

/// Per-file outcome of a batch upload
#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    pub documents: Vec<Document>,
    pub failures: Vec<UploadFailure>,
}

/// Where an upload batch should land
#[derive(Debug, Clone)]
pub enum UploadTarget {
    /// An existing collection; unknown ids are an error
    Collection(String),
    /// Find or create a collection by name
    Named(String),
    /// The shared `Default Uploads` collection
    Default,
}

#[derive(Clone)]
pub struct DocumentProcessor {
    repository: Repository,
    storage: FileStorage,
}

impl DocumentProcessor {
    pub fn new(repository: Repository, storage: FileStorage) -> Self {
        Self { repository, storage }
    }

    /// Resolve the collection a batch is uploaded into
    pub async fn resolve_target(&self, target: UploadTarget) -> Result<Collection> {
        match target {
            UploadTarget::Collection(id) => self.repository.get_collection(&id).await,
            UploadTarget::Named(name) => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(AppError::Validation {
                        message: "collection_name must not be empty".to_string(),
                        field: Some("collection_name".to_string()),
                    });
                }
                match self.repository.find_collection_by_name(&name).await? {
                    Some(collection) => Ok(collection),
                    None => self.repository.create_collection(Some(name), None, Vec::new()).await,
                }
            }
            UploadTarget::Default => {
                match self.repository.find_collection_by_name(DEFAULT_COLLECTION_NAME).await? {
                    Some(collection) => Ok(collection),
                    None => {
                        info!("Creating default uploads collection");
                        self.repository
                            .create_collection(
                                Some(DEFAULT_COLLECTION_NAME.to_string()),
                                Some(DEFAULT_COLLECTION_DESCRIPTION.to_string()),
                                Vec::new(),
                            )
                            .await
                    }
                }
            }
        }
    }

    /// Process every file of a batch into `collection_id`.
    ///
    /// Never fails as a whole once the collection exists; per-file problems
    /// end up in the outcome.
    #[instrument(skip(self, files), fields(file_count = files.len()))]
    pub async fn process_batch(&self, collection_id: &str, files: Vec<UploadedFile>) -> UploadOutcome {
        let mut outcome = UploadOutcome::default();

        for file in files {
            let file_name = file.file_name.clone();
            match self.process_file(collection_id, file).await {
                Ok(document) => outcome.documents.push(document),
                Err(e) => {
                    error!(file = %file_name, error = %e, "Failed to store uploaded file");
                    outcome.failures.push(UploadFailure {
                        file_name,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            collection_id = %collection_id,
            documents = outcome.documents.len(),
            failures = outcome.failures.len(),
            "Upload batch processed"
        );

        outcome
    }

    /// Store, register and extract one file
    #[instrument(skip(self, file), fields(file = %file.file_name))]
    pub async fn process_file(&self, collection_id: &str, file: UploadedFile) -> Result<Document> {
        let start = Instant::now();

        if file.bytes.is_empty() {
            return Err(AppError::Validation {
                message: format!("{} is empty", file.file_name),
                field: Some("files".to_string()),
            });
        }

        let doc_id = ids::new_id(ids::DOCUMENT);
        let stored = self.storage.save_upload(&doc_id, &file.file_name, &file.bytes).await?;

        let new_document = NewDocument {
            id: doc_id.clone(),
            collection_id: collection_id.to_string(),
            doc_name: file.file_name.clone(),
            doc_size_kb: (stored.size_bytes as i64 + 1023) / 1024,
            doc_type: file.content_type.clone().unwrap_or_else(|| PDF_MIME.to_string()),
            doc_url: stored.url.clone(),
            storage_path: stored.relative_path.clone(),
            content_hash: stored.content_hash.clone(),
        };

        if let Err(e) = self.repository.create_document(new_document).await {
            self.storage.delete_quietly(&stored.relative_path).await;
            return Err(e);
        }

        let bytes = file.bytes;
        let name = file.file_name.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_document(&bytes, &name))
            .await
            .map_err(|e| IngestionError::Task(e.to_string()))
            .and_then(|result| result);

        self.record_extraction(&doc_id, &file.file_name, extracted, start).await
    }

    /// Persist an extraction, or mark the document failed when extraction
    /// or its persistence did not succeed
    async fn record_extraction(
        &self,
        doc_id: &str,
        file_name: &str,
        extracted: std::result::Result<ExtractedDocument, IngestionError>,
        start: Instant,
    ) -> Result<Document> {
        let saved = match extracted {
            Ok(extracted) => {
                let sections = extracted.outline.len();
                self.save_extracted(doc_id, extracted)
                    .await
                    .map(|document| (document, sections))
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        match saved {
            Ok((document, sections)) => {
                info!(doc_id = %doc_id, sections, "Document extracted");
                metrics::record_ingestion(start.elapsed().as_secs_f64(), sections, "success");
                Ok(document)
            }
            Err(message) => {
                warn!(doc_id = %doc_id, error = %message, "Extraction failed, keeping document with empty outline");
                let document = self
                    .repository
                    .mark_extraction_failed(doc_id, file_stem(file_name), message)
                    .await?;
                metrics::record_ingestion(start.elapsed().as_secs_f64(), 0, "failed");
                Ok(document)
            }
        }
    }

    async fn save_extracted(&self, doc_id: &str, extracted: ExtractedDocument) -> Result<Document> {
        let outline = extracted
            .outline
            .into_iter()
            .map(|entry| NewOutlineItem {
                section_id: entry.section_id,
                level: entry.level,
                text: entry.text,
                page: entry.page as i32,
                section_text: entry.section_text,
                annotation: entry.annotation,
            })
            .collect();

        self.repository
            .save_extraction(doc_id, Some(extracted.title), extracted.total_pages as i32, outline)
            .await
    }

    /// Delete the files behind removed rows
    pub async fn cleanup(&self, removed: &Removed) {
        for document in &removed.documents {
            self.storage.delete_quietly(&document.storage_path).await;
        }
        for podcast in &removed.podcasts {
            if let Some(path) = &podcast.audio_path {
                self.storage.delete_quietly(path).await;
            }
        }
    }
}

fn file_stem(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::OutlineEntry;
    use crate::testing::simple_pdf;
    use docmind_common::config::StorageConfig;
    use docmind_common::db::models::ProcessingStatus;
    use docmind_common::db::DbPool;

    async fn processor(dir: &tempfile::TempDir) -> (DocumentProcessor, Repository) {
        let pool = DbPool::in_memory().await.unwrap();
        let repository = Repository::new(pool);
        let storage = FileStorage::new(&StorageConfig {
            root: dir.path().to_string_lossy().to_string(),
            base_url: "http://localhost:8000".to_string(),
        });
        storage.init().await.unwrap();
        (DocumentProcessor::new(repository.clone(), storage), repository)
    }

    fn pdf_file(name: &str, bytes: Vec<u8>) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: Some(PDF_MIME.to_string()),
            bytes,
        }
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (processor, repository) = processor(&dir).await;
        let collection = processor.resolve_target(UploadTarget::Default).await.unwrap();
        assert_eq!(collection.name.as_deref(), Some(DEFAULT_COLLECTION_NAME));

        let good = simple_pdf(
            "Revenue Growth Strategy",
            &["Revenue growth depends on pricing and retention across every market segment."],
        );
        let files = vec![
            pdf_file("A.pdf", good),
            pdf_file("broken.pdf", b"not a pdf".to_vec()),
            pdf_file("empty.pdf", Vec::new()),
        ];

        let outcome = processor.process_batch(&collection.id, files).await;
        assert_eq!(outcome.documents.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].file_name, "empty.pdf");

        let ok = &outcome.documents[0];
        assert_eq!(ok.processing_status(), ProcessingStatus::Success);
        assert!(!repository.outline_items(&ok.id).await.unwrap().is_empty());

        let broken = &outcome.documents[1];
        assert_eq!(broken.processing_status(), ProcessingStatus::Failed);
        assert_eq!(broken.doc_title.as_deref(), Some("broken"));
        assert!(broken.processing_error.is_some());
        assert!(repository.outline_items(&broken.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_named_target_reuses_collection() {
        let dir = tempfile::tempdir().unwrap();
        let (processor, _) = processor(&dir).await;

        let first = processor.resolve_target(UploadTarget::Named("Finance".into())).await.unwrap();
        let second = processor.resolve_target(UploadTarget::Named(" Finance ".into())).await.unwrap();
        assert_eq!(first.id, second.id);

        assert!(processor.resolve_target(UploadTarget::Named("  ".into())).await.is_err());
        assert!(processor
            .resolve_target(UploadTarget::Collection("collection_missing".into()))
            .await
            .is_err());
    }

    async fn pending_document(repository: &Repository, collection_id: &str, name: &str) -> String {
        let id = ids::new_id(ids::DOCUMENT);
        repository
            .create_document(NewDocument {
                id: id.clone(),
                collection_id: collection_id.to_string(),
                doc_name: name.to_string(),
                doc_size_kb: 1,
                doc_type: PDF_MIME.to_string(),
                doc_url: format!("http://localhost:8000/storage/uploads/{}", name),
                storage_path: format!("uploads/{}", name),
                content_hash: "00".repeat(32),
            })
            .await
            .unwrap();
        id
    }

    fn entry(section_id: &str, text: &str) -> OutlineEntry {
        OutlineEntry {
            section_id: section_id.to_string(),
            level: "H1".to_string(),
            text: text.to_string(),
            page: 1,
            section_text: format!("{} body", text),
            annotation: None,
        }
    }

    #[tokio::test]
    async fn test_extraction_task_failure_marks_document_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (processor, repository) = processor(&dir).await;
        let collection = processor.resolve_target(UploadTarget::Default).await.unwrap();
        let doc_id = pending_document(&repository, &collection.id, "crashed.pdf").await;

        let document = processor
            .record_extraction(
                &doc_id,
                "crashed.pdf",
                Err(IngestionError::Task("task panicked".to_string())),
                Instant::now(),
            )
            .await
            .unwrap();

        assert_eq!(document.processing_status(), ProcessingStatus::Failed);
        assert_eq!(document.embedding_status(), ProcessingStatus::Failed);
        assert_eq!(document.doc_title.as_deref(), Some("crashed"));
        assert!(document.processing_error.unwrap().contains("task panicked"));
    }

    #[tokio::test]
    async fn test_failed_outline_save_marks_document_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (processor, repository) = processor(&dir).await;
        let collection = processor.resolve_target(UploadTarget::Default).await.unwrap();
        let doc_id = pending_document(&repository, &collection.id, "dup.pdf").await;

        // Two sections sharing a primary key make the outline insert fail
        let extracted = ExtractedDocument {
            title: "Duplicated".to_string(),
            total_pages: 1,
            pages: vec!["Intro body".to_string()],
            outline: vec![entry("sec_same", "Intro"), entry("sec_same", "Again")],
        };

        let document = processor
            .record_extraction(&doc_id, "dup.pdf", Ok(extracted), Instant::now())
            .await
            .unwrap();

        assert_eq!(document.processing_status(), ProcessingStatus::Failed);
        assert_eq!(document.doc_title.as_deref(), Some("dup"));
        assert!(document.processing_error.is_some());
        assert!(repository.outline_items(&doc_id).await.unwrap().is_empty());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("report.final.pdf").as_deref(), Some("report.final"));
        assert_eq!(file_stem(""), None);
    }
}
