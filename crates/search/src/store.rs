//! Recommendation store
//!
//! Lookup table from recommendation id to an immutable result, backed by the
//! `recommendations` table. Results older than the retention window are
//! invisible, and each collection keeps a bounded number of results.

use chrono::{DateTime, Duration, Utc};
use docmind_common::db::models::{Recommendation, RecommendationActiveModel, RecommendationType};
use docmind_common::errors::{AppError, Result};
use docmind_common::{FileStorage, Repository};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One recommended section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub item_id: String,
    pub doc_id: String,
    pub document_title: String,
    pub section_id: String,
    pub section_title: String,
    /// 1-based
    pub page_number: i32,
    pub snippet_text: String,
    pub snippet_explanation: String,
    pub score: f32,
    pub annotation: Option<serde_json::Value>,
    pub quad_points: Vec<Vec<f32>>,
}

/// A stored recommendation and its items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub recommendation_id: String,
    pub recommendation_type: RecommendationType,
    pub collection_ids: Vec<String>,
    pub user_selection_text: Option<String>,
    pub persona: Option<String>,
    pub job_to_be_done: Option<String>,
    pub doc_ids: Vec<String>,
    pub items: Vec<RecommendationItem>,
    pub generated_at: DateTime<Utc>,
    pub latest_insight_id: Option<String>,
    pub latest_podcast_id: Option<String>,
}

impl RecommendationResult {
    pub fn from_model(model: Recommendation) -> Result<Self> {
        Ok(Self {
            recommendation_type: model.kind(),
            recommendation_id: model.id,
            collection_ids: serde_json::from_value(model.collection_ids)?,
            user_selection_text: model.user_selection_text,
            persona: model.persona,
            job_to_be_done: model.job_to_be_done,
            doc_ids: serde_json::from_value(model.doc_ids)?,
            items: serde_json::from_value(model.items)?,
            generated_at: model.generated_at.with_timezone(&Utc),
            latest_insight_id: model.latest_insight_id,
            latest_podcast_id: model.latest_podcast_id,
        })
    }

    fn into_active_model(self) -> Result<RecommendationActiveModel> {
        Ok(RecommendationActiveModel {
            id: Set(self.recommendation_id),
            recommendation_type: Set(self.recommendation_type.into()),
            collection_id: Set(self.collection_ids.first().cloned()),
            collection_ids: Set(serde_json::to_value(&self.collection_ids)?),
            user_selection_text: Set(self.user_selection_text),
            persona: Set(self.persona),
            job_to_be_done: Set(self.job_to_be_done),
            doc_ids: Set(serde_json::to_value(&self.doc_ids)?),
            items: Set(serde_json::to_value(&self.items)?),
            latest_insight_id: Set(self.latest_insight_id),
            latest_podcast_id: Set(self.latest_podcast_id),
            generated_at: Set(self.generated_at.into()),
        })
    }
}

#[derive(Clone)]
pub struct RecommendationStore {
    repository: Repository,
    storage: FileStorage,
    retention: Duration,
    max_per_collection: u64,
}

impl RecommendationStore {
    pub fn new(repository: Repository, storage: FileStorage, retention: Duration, max_per_collection: u64) -> Self {
        Self {
            repository,
            storage,
            retention,
            max_per_collection: max_per_collection.max(1),
        }
    }

    fn cutoff(&self) -> DateTime<Utc> {
        Utc::now() - self.retention
    }

    /// Persist a result, purging expired rows and pruning its collection
    pub async fn save(&self, result: RecommendationResult) -> Result<RecommendationResult> {
        self.purge_expired().await?;

        let collection_id = result.collection_ids.first().cloned();
        let model = self.repository.insert_recommendation(result.into_active_model()?).await?;

        if let Some(collection_id) = collection_id {
            let overflow = self
                .repository
                .recommendations_over_capacity(&collection_id, self.max_per_collection)
                .await?;
            if !overflow.is_empty() {
                debug!(collection_id = %collection_id, pruned = overflow.len(), "Pruning old recommendations");
                self.remove(overflow).await?;
            }
        }

        RecommendationResult::from_model(model)
    }

    /// Look up a live result
    pub async fn get(&self, id: &str) -> Result<RecommendationResult> {
        let not_found = || AppError::RecommendationNotFound { id: id.to_string() };

        let model = self.repository.find_recommendation(id).await?.ok_or_else(not_found)?;
        if model.generated_at.with_timezone(&Utc) < self.cutoff() {
            return Err(not_found());
        }
        RecommendationResult::from_model(model)
    }

    /// Live results of a collection, newest first
    pub async fn list(&self, collection_id: &str) -> Result<Vec<RecommendationResult>> {
        self.repository
            .list_recommendations(collection_id, self.cutoff())
            .await?
            .into_iter()
            .map(RecommendationResult::from_model)
            .collect()
    }

    /// Delete results by id; returns how many existed
    pub async fn delete(&self, ids: Vec<String>) -> Result<u64> {
        let deleted = self.remove(ids).await?;
        info!(deleted, "Recommendations deleted");
        Ok(deleted)
    }

    /// Drop every result past the retention window
    pub async fn purge_expired(&self) -> Result<u64> {
        let expired = self.repository.recommendations_before(self.cutoff()).await?;
        if expired.is_empty() {
            return Ok(0);
        }
        debug!(expired = expired.len(), "Purging expired recommendations");
        self.remove(expired).await
    }

    async fn remove(&self, ids: Vec<String>) -> Result<u64> {
        let (deleted, removed) = self.repository.delete_recommendations(ids).await?;
        for podcast in &removed.podcasts {
            if let Some(path) = &podcast.audio_path {
                self.storage.delete_quietly(path).await;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmind_common::config::StorageConfig;
    use docmind_common::db::DbPool;
    use docmind_common::ids;

    async fn store(retention: Duration, cap: u64) -> RecommendationStore {
        let repository = Repository::new(DbPool::in_memory().await.unwrap());
        let storage = FileStorage::new(&StorageConfig {
            root: std::env::temp_dir().join("docmind-store-tests").to_string_lossy().to_string(),
            base_url: "http://localhost:8000".to_string(),
        });
        RecommendationStore::new(repository, storage, retention, cap)
    }

    fn result(collection_id: &str, generated_at: DateTime<Utc>) -> RecommendationResult {
        RecommendationResult {
            recommendation_id: ids::new_id(ids::RECOMMENDATION),
            recommendation_type: RecommendationType::Text,
            collection_ids: vec![collection_id.to_string()],
            user_selection_text: Some("revenue".to_string()),
            persona: None,
            job_to_be_done: None,
            doc_ids: vec![],
            items: vec![],
            generated_at,
            latest_insight_id: None,
            latest_podcast_id: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = store(Duration::hours(1), 10).await;
        let saved = store.save(result("collection_a", Utc::now())).await.unwrap();

        let loaded = store.get(&saved.recommendation_id).await.unwrap();
        assert_eq!(loaded.collection_ids, vec!["collection_a".to_string()]);
        assert_eq!(loaded.user_selection_text.as_deref(), Some("revenue"));
        assert_eq!(store.list("collection_a").await.unwrap().len(), 1);

        assert_eq!(store.delete(vec![saved.recommendation_id.clone()]).await.unwrap(), 1);
        assert!(matches!(
            store.get(&saved.recommendation_id).await,
            Err(AppError::RecommendationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_results_are_invisible_and_purged() {
        let store = store(Duration::hours(1), 10).await;
        let old = store
            .save(result("collection_a", Utc::now() - Duration::hours(2)))
            .await
            .unwrap();

        assert!(store.get(&old.recommendation_id).await.is_err());
        assert!(store.list("collection_a").await.unwrap().is_empty());

        store.save(result("collection_a", Utc::now())).await.unwrap();
        assert!(store.repository.find_recommendation(&old.recommendation_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collection_capacity() {
        let store = store(Duration::hours(1), 2).await;
        let now = Utc::now();
        let oldest = store.save(result("collection_a", now - Duration::minutes(3))).await.unwrap();
        store.save(result("collection_a", now - Duration::minutes(2))).await.unwrap();
        store.save(result("collection_a", now - Duration::minutes(1))).await.unwrap();
        store.save(result("collection_b", now)).await.unwrap();

        let listed = store.list("collection_a").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|r| r.recommendation_id != oldest.recommendation_id));
        assert!(listed[0].generated_at > listed[1].generated_at);
    }
}
