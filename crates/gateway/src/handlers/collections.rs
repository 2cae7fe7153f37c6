//! Collection management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use docmind_common::{
    db::{models::Collection, CollectionPatch},
    errors::{AppError, Result},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;

/// Request to create a collection
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCollectionRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCollectionRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionResponse {
    pub collection_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub document_count: u64,
    pub latest_insight_id: Option<String>,
    pub latest_podcast_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionResponse {
    pub fn new(collection: Collection, document_count: u64) -> Self {
        Self {
            tags: collection.tag_list(),
            collection_id: collection.id,
            name: collection.name,
            description: collection.description,
            document_count,
            latest_insight_id: collection.latest_insight_id,
            latest_podcast_id: collection.latest_podcast_id,
            created_at: collection.created_at.with_timezone(&Utc),
            updated_at: collection.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Serialize)]
pub struct DeleteCollectionResponse {
    pub collection_id: String,
    pub deleted: bool,
    pub documents_removed: usize,
}

#[derive(Serialize)]
pub struct ReindexResponse {
    pub collection_id: String,
    pub documents_indexed: usize,
    pub chunks_created: usize,
    pub embedding_model: String,
}

/// Create a new collection
pub async fn create_collection(
    State(state): State<AppState>,
    Json(request): Json<CreateCollectionRequest>,
) -> Result<(StatusCode, Json<CollectionResponse>)> {
    request.validate()?;

    let collection = state
        .repository
        .create_collection(
            request.name.map(|n| n.trim().to_string()),
            request.description,
            request.tags,
        )
        .await?;

    tracing::info!(collection_id = %collection.id, "Collection created");

    Ok((StatusCode::CREATED, Json(CollectionResponse::new(collection, 0))))
}

/// List collections, newest first
pub async fn list_collections(State(state): State<AppState>) -> Result<Json<Vec<CollectionResponse>>> {
    let collections = state.repository.list_collections().await?;

    let mut response = Vec::with_capacity(collections.len());
    for collection in collections {
        let count = state.repository.count_documents(&collection.id).await?;
        response.push(CollectionResponse::new(collection, count));
    }

    Ok(Json(response))
}

/// Get a collection by ID
pub async fn get_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CollectionResponse>> {
    let collection = state.repository.get_collection(&id).await?;
    let count = state.repository.count_documents(&id).await?;

    Ok(Json(CollectionResponse::new(collection, count)))
}

/// Update name, description or tags
pub async fn update_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCollectionRequest>,
) -> Result<Json<CollectionResponse>> {
    request.validate()?;

    let patch = CollectionPatch {
        name: request.name.map(|n| n.trim().to_string()),
        description: request.description,
        tags: request.tags,
    };
    let collection = state.repository.update_collection(&id, patch).await?;
    let count = state.repository.count_documents(&id).await?;

    Ok(Json(CollectionResponse::new(collection, count)))
}

/// Delete a collection with its documents, recommendations and artifacts
pub async fn delete_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteCollectionResponse>> {
    let removed = state
        .repository
        .delete_collection(&id)
        .await?
        .ok_or_else(|| AppError::CollectionNotFound { id: id.clone() })?;

    state.processor.cleanup(&removed).await;
    state.index.evict(&id).await;

    tracing::info!(
        collection_id = %id,
        documents = removed.documents.len(),
        podcasts = removed.podcasts.len(),
        "Collection deleted"
    );

    Ok(Json(DeleteCollectionResponse {
        collection_id: id,
        deleted: true,
        documents_removed: removed.documents.len(),
    }))
}

/// Re-embed every document of a collection with the current model
pub async fn reindex_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReindexResponse>> {
    let (documents_indexed, chunks_created) = state.index.ingest_collection(&id).await?;

    Ok(Json(ReindexResponse {
        collection_id: id,
        documents_indexed,
        chunks_created,
        embedding_model: state.index.model_name().to_string(),
    }))
}
