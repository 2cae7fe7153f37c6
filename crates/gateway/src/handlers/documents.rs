//! Document upload and management handlers

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use docmind_common::{
    db::models::{Document, OutlineItem, ProcessingStatus},
    errors::{AppError, Result},
};
use docmind_ingestion::{UploadFailure, UploadTarget, UploadedFile};
use serde::{Deserialize, Serialize};

use super::collections::CollectionResponse;
use crate::AppState;

/// Multipart field carrying the files
const FILES_FIELD: &str = "files";
/// Multipart field naming a collection for `/documents/upload`
const COLLECTION_NAME_FIELD: &str = "collection_name";

#[derive(Debug, Serialize, Deserialize)]
pub struct OutlineEntryResponse {
    pub section_id: String,
    pub level: String,
    pub text: String,
    pub page: i32,
    pub section_text: String,
    pub annotation: Option<serde_json::Value>,
}

impl From<OutlineItem> for OutlineEntryResponse {
    fn from(item: OutlineItem) -> Self {
        Self {
            section_id: item.section_id,
            level: item.level,
            text: item.text,
            page: item.page,
            section_text: item.section_text,
            annotation: item.annotation,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub doc_id: String,
    pub collection_id: String,
    pub doc_name: String,
    pub doc_title: String,
    pub doc_size_kb: i64,
    pub total_pages: i32,
    pub doc_type: String,
    pub doc_url: String,
    pub is_processed: ProcessingStatus,
    pub is_embedding_created: ProcessingStatus,
    pub processing_error: Option<String>,
    pub latest_insight_id: Option<String>,
    pub latest_podcast_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline: Option<Vec<OutlineEntryResponse>>,
}

impl DocumentResponse {
    pub fn new(document: Document) -> Self {
        Self {
            doc_title: document.display_title().to_string(),
            is_processed: document.processing_status(),
            is_embedding_created: document.embedding_status(),
            doc_id: document.id,
            collection_id: document.collection_id,
            doc_name: document.doc_name,
            doc_size_kb: document.doc_size_kb,
            total_pages: document.total_pages,
            doc_type: document.doc_type,
            doc_url: document.doc_url,
            processing_error: document.processing_error,
            latest_insight_id: document.latest_insight_id,
            latest_podcast_id: document.latest_podcast_id,
            created_at: document.created_at.with_timezone(&Utc),
            updated_at: document.updated_at.with_timezone(&Utc),
            outline: None,
        }
    }

    pub fn with_outline(mut self, outline: Vec<OutlineItem>) -> Self {
        self.outline = Some(outline.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub collection: CollectionResponse,
    pub documents: Vec<DocumentResponse>,
    pub failures: Vec<UploadFailure>,
}

#[derive(Serialize)]
pub struct DeleteDocumentResponse {
    pub doc_id: String,
    pub deleted: bool,
}

struct UploadForm {
    files: Vec<UploadedFile>,
    collection_name: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm {
        files: Vec::new(),
        collection_name: None,
    };

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })? {
        match field.name() {
            Some(FILES_FIELD) => {
                let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| AppError::InvalidFormat {
                    message: e.body_text(),
                })?;
                form.files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            Some(COLLECTION_NAME_FIELD) => {
                let name = field.text().await.map_err(|e| AppError::InvalidFormat {
                    message: e.body_text(),
                })?;
                form.collection_name = Some(name).filter(|n| !n.trim().is_empty());
            }
            _ => {}
        }
    }

    if form.files.is_empty() {
        return Err(AppError::Validation {
            message: "At least one file is required".to_string(),
            field: Some(FILES_FIELD.to_string()),
        });
    }
    Ok(form)
}

/// Extract, store and index a batch, then report per-file outcomes
async fn ingest(state: &AppState, target: UploadTarget, files: Vec<UploadedFile>) -> Result<UploadResponse> {
    let collection = state.processor.resolve_target(target).await?;
    let outcome = state.processor.process_batch(&collection.id, files).await;

    let mut documents = Vec::with_capacity(outcome.documents.len());
    for document in outcome.documents {
        if document.processing_status() == ProcessingStatus::Success {
            if let Err(e) = state.index.ingest_document(&document).await {
                tracing::warn!(doc_id = %document.id, error = %e, "Embedding failed after upload");
            }
        }
        let current = state.repository.find_document(&document.id).await?.unwrap_or(document);
        documents.push(DocumentResponse::new(current));
    }

    let count = state.repository.count_documents(&collection.id).await?;

    Ok(UploadResponse {
        collection: CollectionResponse::new(collection, count),
        documents,
        failures: outcome.failures,
    })
}

/// Upload into an existing collection
pub async fn upload_to_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let form = read_form(multipart).await?;
    Ok(Json(ingest(&state, UploadTarget::Collection(id), form.files).await?))
}

/// Upload into a named collection, or the default one
pub async fn upload(State(state): State<AppState>, multipart: Multipart) -> Result<Json<UploadResponse>> {
    let form = read_form(multipart).await?;
    let target = match form.collection_name {
        Some(name) => UploadTarget::Named(name),
        None => UploadTarget::Default,
    };
    Ok(Json(ingest(&state, target, form.files).await?))
}

/// List a collection's documents in upload order
pub async fn list_documents(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DocumentResponse>>> {
    state.repository.get_collection(&id).await?;
    let documents = state.repository.list_documents(&id).await?;

    Ok(Json(documents.into_iter().map(DocumentResponse::new).collect()))
}

/// Get a document with its outline
pub async fn get_document(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<DocumentResponse>> {
    let document = state.repository.get_document(&id).await?;
    let outline = state.repository.outline_items(&id).await?;

    Ok(Json(DocumentResponse::new(document).with_outline(outline)))
}

/// Delete a document, its file, chunks and artifacts
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteDocumentResponse>> {
    let removed = state
        .repository
        .delete_document(&id)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound { id: id.clone() })?;

    if let Some(document) = removed.documents.first() {
        state.index.remove_document(&document.collection_id, &id).await;
    }
    state.processor.cleanup(&removed).await;

    tracing::info!(doc_id = %id, "Document deleted");

    Ok(Json(DeleteDocumentResponse {
        doc_id: id,
        deleted: true,
    }))
}
