//! End-to-end recommendation tests: upload fixture PDFs, index them, query.

use docmind_common::config::{RecommendationConfig, StorageConfig};
use docmind_common::db::models::Document;
use docmind_common::db::DbPool;
use docmind_common::embeddings::HashingEmbedder;
use docmind_common::errors::AppError;
use docmind_common::llm::{LanguageModel, MockLanguageModel};
use docmind_common::{FileStorage, Repository};
use docmind_ingestion::testing::simple_pdf;
use docmind_ingestion::{ChunkingConfig, DocumentProcessor, UploadTarget, UploadedFile};
use docmind_search::{EmbeddingIndex, RecommendationEngine, RecommendationQuery, RecommendationStore};
use std::sync::Arc;

struct Harness {
    _dir: tempfile::TempDir,
    repository: Repository,
    index: Arc<EmbeddingIndex>,
    store: RecommendationStore,
    collection_id: String,
    documents: Vec<Document>,
}

impl Harness {
    fn engine(&self, llm: Arc<dyn LanguageModel>) -> RecommendationEngine {
        RecommendationEngine::new(
            self.index.clone(),
            self.repository.clone(),
            self.store.clone(),
            llm,
            RecommendationConfig::default(),
        )
    }
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let repository = Repository::new(DbPool::in_memory().await.unwrap());
    let storage = FileStorage::new(&StorageConfig {
        root: dir.path().to_string_lossy().to_string(),
        base_url: "http://localhost:8000".to_string(),
    });
    storage.init().await.unwrap();

    let processor = DocumentProcessor::new(repository.clone(), storage.clone());
    let collection = processor
        .resolve_target(UploadTarget::Named("Strategy".into()))
        .await
        .unwrap();

    let files = vec![
        UploadedFile {
            file_name: "A.pdf".into(),
            content_type: Some("application/pdf".into()),
            bytes: simple_pdf(
                "Revenue Growth Strategy",
                &["Our revenue growth strategy focuses on pricing and retention in new markets."],
            ),
        },
        UploadedFile {
            file_name: "B.pdf".into(),
            content_type: Some("application/pdf".into()),
            bytes: simple_pdf(
                "Garden Notes",
                &["An unrelated topic about planting tomatoes and watering the garden daily."],
            ),
        },
    ];
    let outcome = processor.process_batch(&collection.id, files).await;
    assert!(outcome.failures.is_empty());

    let index = Arc::new(EmbeddingIndex::new(
        repository.clone(),
        Arc::new(HashingEmbedder::new(384)),
        ChunkingConfig::default(),
    ));
    for document in &outcome.documents {
        index.ingest_document(document).await.unwrap();
    }

    let store = RecommendationStore::new(repository.clone(), storage, chrono::Duration::hours(168), 50);

    Harness {
        _dir: dir,
        repository,
        index,
        store,
        collection_id: collection.id,
        documents: outcome.documents,
    }
}

fn revenue_query() -> RecommendationQuery {
    RecommendationQuery::Text {
        selected_text: "revenue growth".into(),
    }
}

#[tokio::test]
async fn test_relevant_document_ranks_first() {
    let h = harness().await;
    let engine = h.engine(Arc::new(MockLanguageModel::new()));

    let result = engine
        .recommend(revenue_query(), vec![h.collection_id.clone()])
        .await
        .unwrap();

    assert!(!result.items.is_empty());
    let top = &result.items[0];
    assert_eq!(top.doc_id, h.documents[0].id);
    assert_eq!(top.document_title, "Revenue Growth Strategy");
    assert!(!top.snippet_text.is_empty());
    assert_eq!(top.snippet_explanation, "This section is relevant to the request.");
    assert!(!top.quad_points.is_empty());
    assert!(result.doc_ids.contains(&h.documents[0].id));

    let stored = h.store.get(&result.recommendation_id).await.unwrap();
    assert_eq!(stored.items, result.items);
}

#[tokio::test]
async fn test_ranking_is_deterministic() {
    let h = harness().await;
    let engine = h.engine(Arc::new(MockLanguageModel::new()));
    let ids = vec![h.collection_id.clone()];

    let first = engine.recommend(revenue_query(), ids.clone()).await.unwrap();
    let second = engine.recommend(revenue_query(), ids).await.unwrap();

    let order = |items: &[docmind_search::RecommendationItem]| {
        items
            .iter()
            .map(|i| (i.doc_id.clone(), i.section_id.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(order(&first.items), order(&second.items));
    assert_ne!(first.recommendation_id, second.recommendation_id);
}

#[tokio::test]
async fn test_empty_collection_list_returns_stored_empty_result() {
    let h = harness().await;
    let engine = h.engine(Arc::new(MockLanguageModel::new()));

    let result = engine.recommend(revenue_query(), vec![]).await.unwrap();
    assert!(result.items.is_empty());
    assert!(h.store.get(&result.recommendation_id).await.is_ok());
}

#[tokio::test]
async fn test_persona_without_job_is_rejected_before_retrieval() {
    let h = harness().await;
    let llm = Arc::new(MockLanguageModel::new());
    let engine = h.engine(llm.clone());

    let err = engine
        .recommend(
            RecommendationQuery::Persona {
                persona: "Investor".into(),
                job_to_be_done: "   ".into(),
            },
            vec![h.collection_id.clone()],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation { .. }));
    assert!(llm.calls().is_empty());
    assert!(h.store.list(&h.collection_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_persona_query_returns_items() {
    let h = harness().await;
    let engine = h.engine(Arc::new(MockLanguageModel::new()));

    let result = engine
        .recommend(
            RecommendationQuery::Persona {
                persona: "Investor".into(),
                job_to_be_done: "assess revenue growth".into(),
            },
            vec![h.collection_id.clone()],
        )
        .await
        .unwrap();

    assert_eq!(result.persona.as_deref(), Some("Investor"));
    assert!(!result.items.is_empty());
    assert!(result.items.len() <= RecommendationConfig::default().num_results);
}

#[tokio::test]
async fn test_llm_failure_degrades_explanation() {
    let h = harness().await;
    let engine = h.engine(Arc::new(MockLanguageModel::failing()));

    let result = engine
        .recommend(revenue_query(), vec![h.collection_id.clone()])
        .await
        .unwrap();

    assert!(!result.items.is_empty());
    assert!(result
        .items
        .iter()
        .all(|i| i.snippet_explanation.starts_with("Could not generate explanation:")));
}

#[tokio::test]
async fn test_model_mismatch_is_a_conflict() {
    let h = harness().await;
    let other_index = Arc::new(EmbeddingIndex::new(
        h.repository.clone(),
        Arc::new(HashingEmbedder::new(32)),
        ChunkingConfig::default(),
    ));
    let engine = RecommendationEngine::new(
        other_index,
        h.repository.clone(),
        h.store.clone(),
        Arc::new(MockLanguageModel::new()),
        RecommendationConfig::default(),
    );

    let err = engine
        .recommend(revenue_query(), vec![h.collection_id.clone()])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmbeddingModelMismatch { .. }));
}
