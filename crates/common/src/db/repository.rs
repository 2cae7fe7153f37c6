//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support. Cascading deletes
//! are performed here, inside a transaction, so they behave the same on
//! every backend.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::ids;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

/// Fields for a freshly uploaded document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: String,
    pub collection_id: String,
    pub doc_name: String,
    pub doc_size_kb: i64,
    pub doc_type: String,
    pub doc_url: String,
    pub storage_path: String,
    pub content_hash: String,
}

/// One outline entry produced by the extractor
#[derive(Debug, Clone)]
pub struct NewOutlineItem {
    pub section_id: String,
    pub level: String,
    pub text: String,
    pub page: i32,
    pub section_text: String,
    pub annotation: Option<serde_json::Value>,
}

/// Partial update for a collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Rows removed by a cascading delete that own files on disk
#[derive(Debug, Default)]
pub struct Removed {
    pub documents: Vec<Document>,
    pub podcasts: Vec<Podcast>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Collection Operations
    // ========================================================================

    /// Create a new collection
    pub async fn create_collection(
        &self,
        name: Option<String>,
        description: Option<String>,
        tags: Vec<String>,
    ) -> Result<Collection> {
        let now = Utc::now();

        let collection = CollectionActiveModel {
            id: Set(ids::new_id(ids::COLLECTION)),
            name: Set(name),
            description: Set(description),
            tags: Set(serde_json::json!(tags)),
            latest_insight_id: Set(None),
            latest_podcast_id: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        collection.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find collection by ID
    pub async fn find_collection(&self, id: &str) -> Result<Option<Collection>> {
        CollectionEntity::find_by_id(id.to_string())
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find collection by ID or fail with `CollectionNotFound`
    pub async fn get_collection(&self, id: &str) -> Result<Collection> {
        self.find_collection(id)
            .await?
            .ok_or_else(|| AppError::CollectionNotFound { id: id.to_string() })
    }

    /// Find the first collection with an exact name
    pub async fn find_collection_by_name(&self, name: &str) -> Result<Option<Collection>> {
        CollectionEntity::find()
            .filter(CollectionColumn::Name.eq(name))
            .order_by_asc(CollectionColumn::CreatedAt)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// List all collections, newest first
    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        CollectionEntity::find()
            .order_by_desc(CollectionColumn::CreatedAt)
            .order_by_asc(CollectionColumn::Id)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Apply a partial update
    pub async fn update_collection(&self, id: &str, patch: CollectionPatch) -> Result<Collection> {
        let mut collection: CollectionActiveModel = self.get_collection(id).await?.into();

        if let Some(name) = patch.name {
            collection.name = Set(Some(name));
        }
        if let Some(description) = patch.description {
            collection.description = Set(Some(description));
        }
        if let Some(tags) = patch.tags {
            collection.tags = Set(serde_json::json!(tags));
        }
        collection.updated_at = Set(Utc::now().into());

        collection.update(self.conn()).await.map_err(Into::into)
    }

    /// Number of documents in a collection
    pub async fn count_documents(&self, collection_id: &str) -> Result<u64> {
        DocumentEntity::find()
            .filter(DocumentColumn::CollectionId.eq(collection_id))
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Delete a collection and everything derived from it.
    ///
    /// Returns `None` when the collection does not exist.
    pub async fn delete_collection(&self, id: &str) -> Result<Option<Removed>> {
        let txn = self.conn().begin().await?;

        if CollectionEntity::find_by_id(id.to_string()).one(&txn).await?.is_none() {
            return Ok(None);
        }

        let documents = DocumentEntity::find()
            .filter(DocumentColumn::CollectionId.eq(id))
            .all(&txn)
            .await?;
        let doc_ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();

        let recommendation_ids: Vec<String> = RecommendationEntity::find()
            .filter(RecommendationColumn::CollectionId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut sources = vec![(SourceType::Collection, vec![id.to_string()])];
        sources.push((SourceType::Document, doc_ids.clone()));
        sources.push((SourceType::Recommendation, recommendation_ids.clone()));
        let podcasts = delete_artifacts(&txn, &sources).await?;

        RecommendationEntity::delete_many()
            .filter(RecommendationColumn::Id.is_in(recommendation_ids))
            .exec(&txn)
            .await?;

        ChunkEntity::delete_many()
            .filter(ChunkColumn::CollectionId.eq(id))
            .exec(&txn)
            .await?;

        if !doc_ids.is_empty() {
            OutlineItemEntity::delete_many()
                .filter(OutlineItemColumn::DocumentId.is_in(doc_ids.clone()))
                .exec(&txn)
                .await?;
            DocumentEntity::delete_many()
                .filter(DocumentColumn::Id.is_in(doc_ids))
                .exec(&txn)
                .await?;
        }

        CollectionEntity::delete_by_id(id.to_string()).exec(&txn).await?;

        txn.commit().await?;

        Ok(Some(Removed { documents, podcasts }))
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Create a document in the pending state
    pub async fn create_document(&self, new: NewDocument) -> Result<Document> {
        let now = Utc::now();

        let document = DocumentActiveModel {
            id: Set(new.id),
            collection_id: Set(new.collection_id),
            doc_name: Set(new.doc_name),
            doc_title: Set(None),
            doc_size_kb: Set(new.doc_size_kb),
            total_pages: Set(0),
            doc_type: Set(new.doc_type),
            doc_url: Set(new.doc_url),
            storage_path: Set(new.storage_path),
            content_hash: Set(new.content_hash),
            is_processed: Set(ProcessingStatus::Pending.into()),
            is_embedding_created: Set(ProcessingStatus::Pending.into()),
            processing_error: Set(None),
            latest_insight_id: Set(None),
            latest_podcast_id: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        document.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find document by ID
    pub async fn find_document(&self, id: &str) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id.to_string())
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find document by ID or fail with `DocumentNotFound`
    pub async fn get_document(&self, id: &str) -> Result<Document> {
        self.find_document(id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
    }

    /// Documents of a collection in upload order
    pub async fn list_documents(&self, collection_id: &str) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::CollectionId.eq(collection_id))
            .order_by_asc(DocumentColumn::CreatedAt)
            .order_by_asc(DocumentColumn::Id)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Store extraction output and mark the document processed.
    ///
    /// Any previous outline is replaced.
    pub async fn save_extraction(
        &self,
        document_id: &str,
        title: Option<String>,
        total_pages: i32,
        outline: Vec<NewOutlineItem>,
    ) -> Result<Document> {
        let txn = self.conn().begin().await?;

        let mut document: DocumentActiveModel = DocumentEntity::find_by_id(document_id.to_string())
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: document_id.to_string() })?
            .into();

        OutlineItemEntity::delete_many()
            .filter(OutlineItemColumn::DocumentId.eq(document_id))
            .exec(&txn)
            .await?;

        let rows: Vec<OutlineItemActiveModel> = outline
            .into_iter()
            .enumerate()
            .map(|(position, item)| OutlineItemActiveModel {
                section_id: Set(item.section_id),
                document_id: Set(document_id.to_string()),
                position: Set(position as i32),
                level: Set(item.level),
                text: Set(item.text),
                page: Set(item.page),
                section_text: Set(item.section_text),
                annotation: Set(item.annotation),
            })
            .collect();

        if !rows.is_empty() {
            OutlineItemEntity::insert_many(rows).exec(&txn).await?;
        }

        document.doc_title = Set(title);
        document.total_pages = Set(total_pages);
        document.is_processed = Set(ProcessingStatus::Success.into());
        document.processing_error = Set(None);
        document.updated_at = Set(Utc::now().into());
        let document = document.update(&txn).await?;

        txn.commit().await?;
        Ok(document)
    }

    /// Record a failed extraction; the outline stays empty
    pub async fn mark_extraction_failed(
        &self,
        document_id: &str,
        fallback_title: Option<String>,
        error: String,
    ) -> Result<Document> {
        let mut document: DocumentActiveModel = self.get_document(document_id).await?.into();

        document.doc_title = Set(fallback_title);
        document.total_pages = Set(0);
        document.is_processed = Set(ProcessingStatus::Failed.into());
        document.is_embedding_created = Set(ProcessingStatus::Failed.into());
        document.processing_error = Set(Some(error));
        document.updated_at = Set(Utc::now().into());

        document.update(self.conn()).await.map_err(Into::into)
    }

    /// Update the embedding status of a document
    pub async fn set_embedding_status(
        &self,
        document_id: &str,
        status: ProcessingStatus,
        error: Option<String>,
    ) -> Result<Document> {
        let mut document: DocumentActiveModel = self.get_document(document_id).await?.into();

        document.is_embedding_created = Set(status.into());
        if error.is_some() {
            document.processing_error = Set(error);
        }
        document.updated_at = Set(Utc::now().into());

        document.update(self.conn()).await.map_err(Into::into)
    }

    /// Outline of a document in order
    pub async fn outline_items(&self, document_id: &str) -> Result<Vec<OutlineItem>> {
        OutlineItemEntity::find()
            .filter(OutlineItemColumn::DocumentId.eq(document_id))
            .order_by_asc(OutlineItemColumn::Position)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Delete a document with its outline, chunks and generated artifacts
    pub async fn delete_document(&self, id: &str) -> Result<Option<Removed>> {
        let txn = self.conn().begin().await?;

        let Some(document) = DocumentEntity::find_by_id(id.to_string()).one(&txn).await? else {
            return Ok(None);
        };

        let podcasts = delete_artifacts(&txn, &[(SourceType::Document, vec![id.to_string()])]).await?;

        ChunkEntity::delete_many()
            .filter(ChunkColumn::DocumentId.eq(id))
            .exec(&txn)
            .await?;
        OutlineItemEntity::delete_many()
            .filter(OutlineItemColumn::DocumentId.eq(id))
            .exec(&txn)
            .await?;
        DocumentEntity::delete_by_id(id.to_string()).exec(&txn).await?;

        txn.commit().await?;

        Ok(Some(Removed {
            documents: vec![document],
            podcasts,
        }))
    }

    // ========================================================================
    // Chunk Operations
    // ========================================================================

    /// Replace every chunk of a document in one transaction
    pub async fn replace_chunks(&self, document_id: &str, chunks: Vec<ChunkActiveModel>) -> Result<()> {
        let txn = self.conn().begin().await?;

        ChunkEntity::delete_many()
            .filter(ChunkColumn::DocumentId.eq(document_id))
            .exec(&txn)
            .await?;

        if !chunks.is_empty() {
            ChunkEntity::insert_many(chunks).exec(&txn).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// All chunks of a collection in a stable order
    pub async fn chunks_for_collection(&self, collection_id: &str) -> Result<Vec<Chunk>> {
        ChunkEntity::find()
            .filter(ChunkColumn::CollectionId.eq(collection_id))
            .order_by_asc(ChunkColumn::CreatedAt)
            .order_by_asc(ChunkColumn::DocumentId)
            .order_by_asc(ChunkColumn::ChunkIndex)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Chunks of a single document in order
    pub async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        ChunkEntity::find()
            .filter(ChunkColumn::DocumentId.eq(document_id))
            .order_by_asc(ChunkColumn::ChunkIndex)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Recommendation Operations
    // ========================================================================

    /// Persist a finished recommendation
    pub async fn insert_recommendation(&self, recommendation: RecommendationActiveModel) -> Result<Recommendation> {
        recommendation.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find recommendation by ID regardless of age
    pub async fn find_recommendation(&self, id: &str) -> Result<Option<Recommendation>> {
        RecommendationEntity::find_by_id(id.to_string())
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Recommendations for a collection generated after `since`, newest first
    pub async fn list_recommendations(
        &self,
        collection_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>> {
        RecommendationEntity::find()
            .filter(RecommendationColumn::CollectionId.eq(collection_id))
            .filter(RecommendationColumn::GeneratedAt.gte(since))
            .order_by_desc(RecommendationColumn::GeneratedAt)
            .order_by_asc(RecommendationColumn::Id)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Delete recommendations (and artifacts generated from them) by id
    pub async fn delete_recommendations(&self, ids: Vec<String>) -> Result<(u64, Removed)> {
        if ids.is_empty() {
            return Ok((0, Removed::default()));
        }

        let txn = self.conn().begin().await?;

        let podcasts = delete_artifacts(&txn, &[(SourceType::Recommendation, ids.clone())]).await?;
        let result = RecommendationEntity::delete_many()
            .filter(RecommendationColumn::Id.is_in(ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        Ok((
            result.rows_affected,
            Removed {
                documents: Vec::new(),
                podcasts,
            },
        ))
    }

    /// Ids of recommendations generated before `cutoff`
    pub async fn recommendations_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(RecommendationEntity::find()
            .filter(RecommendationColumn::GeneratedAt.lt(cutoff))
            .all(self.conn())
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }

    /// Ids of a collection's recommendations beyond the newest `keep`
    pub async fn recommendations_over_capacity(&self, collection_id: &str, keep: u64) -> Result<Vec<String>> {
        Ok(RecommendationEntity::find()
            .filter(RecommendationColumn::CollectionId.eq(collection_id))
            .order_by_desc(RecommendationColumn::GeneratedAt)
            .order_by_asc(RecommendationColumn::Id)
            .all(self.conn())
            .await?
            .into_iter()
            .skip(keep as usize)
            .map(|r| r.id)
            .collect())
    }

    // ========================================================================
    // Insight Operations
    // ========================================================================

    /// Persist an insight
    pub async fn insert_insight(
        &self,
        source_type: SourceType,
        source_id: &str,
        items: serde_json::Value,
    ) -> Result<Insight> {
        let insight = InsightActiveModel {
            id: Set(ids::new_id(ids::INSIGHT)),
            source_type: Set(source_type.into()),
            source_id: Set(source_id.to_string()),
            items: Set(items),
            generated_at: Set(Utc::now().into()),
        };

        insight.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find insight by ID
    pub async fn find_insight(&self, id: &str) -> Result<Option<Insight>> {
        InsightEntity::find_by_id(id.to_string())
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Delete insight by ID
    pub async fn delete_insight(&self, id: &str) -> Result<bool> {
        let result = InsightEntity::delete_by_id(id.to_string())
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Podcast Operations
    // ========================================================================

    /// Create a podcast in the pending state
    pub async fn create_podcast(&self, source_type: SourceType, source_id: &str) -> Result<Podcast> {
        let now = Utc::now();

        let podcast = PodcastActiveModel {
            id: Set(ids::new_id(ids::PODCAST)),
            source_type: Set(source_type.into()),
            source_id: Set(source_id.to_string()),
            status: Set(PodcastStatus::Pending.into()),
            audio_url: Set(None),
            audio_path: Set(None),
            duration_seconds: Set(None),
            short_description: Set(None),
            transcript: Set(None),
            error_message: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        podcast.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find podcast by ID
    pub async fn find_podcast(&self, id: &str) -> Result<Option<Podcast>> {
        PodcastEntity::find_by_id(id.to_string())
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Move a podcast to a new status, optionally recording a failure reason
    pub async fn update_podcast_status(
        &self,
        id: &str,
        status: PodcastStatus,
        error_message: Option<String>,
    ) -> Result<Podcast> {
        let mut podcast: PodcastActiveModel = self
            .find_podcast(id)
            .await?
            .ok_or_else(|| AppError::PodcastNotFound { id: id.to_string() })?
            .into();

        podcast.status = Set(status.into());
        if error_message.is_some() {
            podcast.error_message = Set(error_message);
        }
        podcast.updated_at = Set(Utc::now().into());

        podcast.update(self.conn()).await.map_err(Into::into)
    }

    /// Mark a podcast failed and detach any audio it pointed at
    pub async fn fail_podcast(&self, id: &str, error_message: String) -> Result<Podcast> {
        let mut podcast: PodcastActiveModel = self
            .find_podcast(id)
            .await?
            .ok_or_else(|| AppError::PodcastNotFound { id: id.to_string() })?
            .into();

        podcast.status = Set(PodcastStatus::Failed.into());
        podcast.error_message = Set(Some(error_message));
        podcast.audio_url = Set(None);
        podcast.audio_path = Set(None);
        podcast.duration_seconds = Set(None);
        podcast.updated_at = Set(Utc::now().into());

        podcast.update(self.conn()).await.map_err(Into::into)
    }

    /// Mark a podcast completed with its audio and transcript
    pub async fn complete_podcast(
        &self,
        id: &str,
        audio_url: String,
        audio_path: String,
        duration_seconds: f64,
        short_description: Option<String>,
        transcript: serde_json::Value,
    ) -> Result<Podcast> {
        let mut podcast: PodcastActiveModel = self
            .find_podcast(id)
            .await?
            .ok_or_else(|| AppError::PodcastNotFound { id: id.to_string() })?
            .into();

        podcast.status = Set(PodcastStatus::Completed.into());
        podcast.audio_url = Set(Some(audio_url));
        podcast.audio_path = Set(Some(audio_path));
        podcast.duration_seconds = Set(Some(duration_seconds));
        podcast.short_description = Set(short_description);
        podcast.transcript = Set(Some(transcript));
        podcast.error_message = Set(None);
        podcast.updated_at = Set(Utc::now().into());

        podcast.update(self.conn()).await.map_err(Into::into)
    }

    /// Delete podcast by ID
    pub async fn delete_podcast(&self, id: &str) -> Result<bool> {
        let result = PodcastEntity::delete_by_id(id.to_string())
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Latest Artifact Pointers
    // ========================================================================

    /// Point a source at its newest insight; returns the previous id
    pub async fn set_latest_insight(
        &self,
        source_type: SourceType,
        source_id: &str,
        insight_id: &str,
    ) -> Result<Option<String>> {
        self.set_latest(source_type, source_id, insight_id, Artifact::Insight)
            .await
    }

    /// Point a source at its newest podcast; returns the previous id
    pub async fn set_latest_podcast(
        &self,
        source_type: SourceType,
        source_id: &str,
        podcast_id: &str,
    ) -> Result<Option<String>> {
        self.set_latest(source_type, source_id, podcast_id, Artifact::Podcast)
            .await
    }

    async fn set_latest(
        &self,
        source_type: SourceType,
        source_id: &str,
        artifact_id: &str,
        artifact: Artifact,
    ) -> Result<Option<String>> {
        let value = Set(Some(artifact_id.to_string()));

        match source_type {
            SourceType::Collection => {
                let current = self.get_collection(source_id).await?;
                let previous = artifact.pick(&current.latest_insight_id, &current.latest_podcast_id);
                let mut active: CollectionActiveModel = current.into();
                match artifact {
                    Artifact::Insight => active.latest_insight_id = value,
                    Artifact::Podcast => active.latest_podcast_id = value,
                }
                active.updated_at = Set(Utc::now().into());
                active.update(self.conn()).await?;
                Ok(previous)
            }
            SourceType::Document => {
                let current = self.get_document(source_id).await?;
                let previous = artifact.pick(&current.latest_insight_id, &current.latest_podcast_id);
                let mut active: DocumentActiveModel = current.into();
                match artifact {
                    Artifact::Insight => active.latest_insight_id = value,
                    Artifact::Podcast => active.latest_podcast_id = value,
                }
                active.updated_at = Set(Utc::now().into());
                active.update(self.conn()).await?;
                Ok(previous)
            }
            SourceType::Recommendation => {
                let current = self
                    .find_recommendation(source_id)
                    .await?
                    .ok_or_else(|| AppError::RecommendationNotFound { id: source_id.to_string() })?;
                let previous = artifact.pick(&current.latest_insight_id, &current.latest_podcast_id);
                let mut active: RecommendationActiveModel = current.into();
                match artifact {
                    Artifact::Insight => active.latest_insight_id = value,
                    Artifact::Podcast => active.latest_podcast_id = value,
                }
                active.update(self.conn()).await?;
                Ok(previous)
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Artifact {
    Insight,
    Podcast,
}

impl Artifact {
    fn pick(&self, insight: &Option<String>, podcast: &Option<String>) -> Option<String> {
        match self {
            Artifact::Insight => insight.clone(),
            Artifact::Podcast => podcast.clone(),
        }
    }
}

/// Delete insights and podcasts generated from any of the given sources.
///
/// Returns the removed podcasts so their audio files can be cleaned up.
async fn delete_artifacts<C: ConnectionTrait>(
    conn: &C,
    sources: &[(SourceType, Vec<String>)],
) -> Result<Vec<Podcast>> {
    let mut insight_cond = Condition::any();
    let mut podcast_cond = Condition::any();
    let mut any = false;

    for (source_type, source_ids) in sources {
        if source_ids.is_empty() {
            continue;
        }
        any = true;
        insight_cond = insight_cond.add(
            Condition::all()
                .add(InsightColumn::SourceType.eq(source_type.as_str()))
                .add(InsightColumn::SourceId.is_in(source_ids.clone())),
        );
        podcast_cond = podcast_cond.add(
            Condition::all()
                .add(PodcastColumn::SourceType.eq(source_type.as_str()))
                .add(PodcastColumn::SourceId.is_in(source_ids.clone())),
        );
    }

    if !any {
        return Ok(Vec::new());
    }

    InsightEntity::delete_many()
        .filter(insight_cond)
        .exec(conn)
        .await?;

    let podcasts = PodcastEntity::find()
        .filter(podcast_cond.clone())
        .all(conn)
        .await?;

    PodcastEntity::delete_many()
        .filter(podcast_cond)
        .exec(conn)
        .await?;

    Ok(podcasts)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> Repository {
        Repository::new(DbPool::in_memory().await.unwrap())
    }

    fn new_document(collection_id: &str, name: &str) -> NewDocument {
        NewDocument {
            id: ids::new_id(ids::DOCUMENT),
            collection_id: collection_id.to_string(),
            doc_name: name.to_string(),
            doc_size_kb: 1,
            doc_type: "application/pdf".to_string(),
            doc_url: format!("http://localhost/storage/uploads/{}", name),
            storage_path: format!("uploads/{}", name),
            content_hash: "00".to_string(),
        }
    }

    #[tokio::test]
    async fn test_collection_crud() {
        let repo = repo().await;

        let created = repo
            .create_collection(Some("Research".into()), None, vec!["ml".into(), "nlp".into()])
            .await
            .unwrap();
        assert!(created.id.starts_with("collection_"));
        assert_eq!(created.tag_list(), vec!["ml", "nlp"]);

        let updated = repo
            .update_collection(
                &created.id,
                CollectionPatch {
                    description: Some("Papers".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("Research"));
        assert_eq!(updated.description.as_deref(), Some("Papers"));

        assert_eq!(repo.list_collections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_collection_cascades() {
        let repo = repo().await;
        let collection = repo.create_collection(None, None, vec![]).await.unwrap();
        let doc = repo.create_document(new_document(&collection.id, "a.pdf")).await.unwrap();

        repo.save_extraction(
            &doc.id,
            Some("A".into()),
            1,
            vec![NewOutlineItem {
                section_id: ids::new_id(ids::SECTION),
                level: "H1".into(),
                text: "Intro".into(),
                page: 1,
                section_text: "Body".into(),
                annotation: None,
            }],
        )
        .await
        .unwrap();
        let insight = repo
            .insert_insight(SourceType::Document, &doc.id, serde_json::json!([]))
            .await
            .unwrap();

        let removed = repo.delete_collection(&collection.id).await.unwrap().unwrap();
        assert_eq!(removed.documents.len(), 1);

        assert!(repo.find_document(&doc.id).await.unwrap().is_none());
        assert!(repo.outline_items(&doc.id).await.unwrap().is_empty());
        assert!(repo.find_insight(&insight.id).await.unwrap().is_none());
        assert!(repo.delete_collection(&collection.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_pointer_returns_previous() {
        let repo = repo().await;
        let collection = repo.create_collection(None, None, vec![]).await.unwrap();

        let first = repo
            .set_latest_insight(SourceType::Collection, &collection.id, "insight_1")
            .await
            .unwrap();
        let second = repo
            .set_latest_insight(SourceType::Collection, &collection.id, "insight_2")
            .await
            .unwrap();

        assert_eq!(first, None);
        assert_eq!(second.as_deref(), Some("insight_1"));
    }

    #[tokio::test]
    async fn test_podcast_status_transitions() {
        let repo = repo().await;
        let podcast = repo.create_podcast(SourceType::Collection, "collection_x").await.unwrap();
        assert_eq!(podcast.podcast_status(), PodcastStatus::Pending);

        let failed = repo
            .update_podcast_status(&podcast.id, PodcastStatus::Failed, Some("tts down".into()))
            .await
            .unwrap();
        assert_eq!(failed.podcast_status(), PodcastStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("tts down"));
    }

    #[tokio::test]
    async fn test_failing_a_completed_podcast_detaches_audio() {
        let repo = repo().await;
        let podcast = repo.create_podcast(SourceType::Collection, "collection_x").await.unwrap();
        repo.complete_podcast(
            &podcast.id,
            "http://localhost/storage/podcasts/p.wav".into(),
            "podcasts/p.wav".into(),
            3.5,
            None,
            serde_json::json!([]),
        )
        .await
        .unwrap();

        let failed = repo.fail_podcast(&podcast.id, "pointer update failed".into()).await.unwrap();
        assert_eq!(failed.podcast_status(), PodcastStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("pointer update failed"));
        assert!(failed.audio_url.is_none());
        assert!(failed.audio_path.is_none());
        assert!(failed.duration_seconds.is_none());

        let missing = repo.fail_podcast("podcast_missing", "x".into()).await;
        assert!(matches!(missing, Err(AppError::PodcastNotFound { .. })));
    }
}
