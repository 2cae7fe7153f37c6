//! DocMind API Gateway
//!
//! HTTP surface over the ingestion, search and synthesis pipelines.
//! Handles:
//! - Collection and document management, including multipart uploads
//! - Recommendations, insights and podcasts
//! - Rate limiting of generation routes
//! - Static serving of stored uploads and audio

pub mod handlers;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use docmind_common::{
    config::AppConfig,
    embeddings::Embedder,
    llm::LanguageModel,
    speech::SpeechSynthesizer,
    FileStorage, Repository,
};
use docmind_ingestion::{ChunkingConfig, DocumentProcessor};
use docmind_search::{EmbeddingIndex, RecommendationEngine, RecommendationStore};
use docmind_synthesis::{InsightGenerator, PodcastSynthesizer};
use middleware::rate_limit::{create_rate_limiter, GlobalRateLimiter};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Repository,
    pub storage: FileStorage,
    pub processor: DocumentProcessor,
    pub index: Arc<EmbeddingIndex>,
    pub recommender: Arc<RecommendationEngine>,
    pub recommendations: RecommendationStore,
    pub insights: Arc<InsightGenerator>,
    pub podcasts: Arc<PodcastSynthesizer>,
    pub limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    /// Wire every pipeline from configuration and injected providers
    pub fn new(
        config: AppConfig,
        repository: Repository,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let storage = FileStorage::new(&config.storage);
        let processor = DocumentProcessor::new(repository.clone(), storage.clone());

        let index = Arc::new(EmbeddingIndex::new(
            repository.clone(),
            embedder,
            ChunkingConfig::from(&config.chunking),
        ));

        let recommendations = RecommendationStore::new(
            repository.clone(),
            storage.clone(),
            config.recommendation_retention(),
            config.recommendation.max_per_collection,
        );
        let recommender = Arc::new(RecommendationEngine::new(
            index.clone(),
            repository.clone(),
            recommendations.clone(),
            llm.clone(),
            config.recommendation.clone(),
        ));

        let insights = Arc::new(InsightGenerator::new(
            repository.clone(),
            recommendations.clone(),
            llm.clone(),
        ));
        let podcasts = Arc::new(PodcastSynthesizer::new(
            repository.clone(),
            recommendations.clone(),
            storage.clone(),
            llm,
            speech,
            insights.clone(),
            config.speech.clone(),
            config.podcast.clone(),
        ));

        let limiter = config
            .rate_limit
            .enabled
            .then(|| create_rate_limiter(config.rate_limit.requests_per_second, config.rate_limit.burst));

        Self {
            config: Arc::new(config),
            repository,
            storage,
            processor,
            index,
            recommender,
            recommendations,
            insights,
            podcasts,
            limiter,
        }
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    use handlers::{collections, documents, health, insights, podcasts, recommendations};

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // LLM-backed routes share the rate limiter
    let generation_routes = Router::new()
        .route("/recommendations/text", post(recommendations::recommend_text))
        .route("/recommendations/persona", post(recommendations::recommend_persona))
        .route("/insights", post(insights::create_insight))
        .route("/podcasts/recommendations/{id}", post(podcasts::from_recommendation))
        .route("/podcasts/collections/{id}", post(podcasts::from_collection))
        .route("/podcasts/documents/{id}", post(podcasts::from_document))
        .route_layer(from_fn_with_state(state.clone(), middleware::rate_limit::rate_limit));

    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))

        // Collection endpoints
        .route("/collections", post(collections::create_collection).get(collections::list_collections))
        .route(
            "/collections/{id}",
            get(collections::get_collection)
                .patch(collections::update_collection)
                .delete(collections::delete_collection),
        )
        .route("/collections/{id}/documents", get(documents::list_documents))
        .route("/collections/{id}/documents/upload", post(documents::upload_to_collection))
        .route("/collections/{id}/reindex", post(collections::reindex_collection))
        .route("/collections/{id}/recommendations", get(recommendations::list_recommendations))

        // Document endpoints
        .route("/documents/upload", post(documents::upload))
        .route("/documents/{id}", get(documents::get_document).delete(documents::delete_document))

        // Stored artifacts
        .route("/recommendations", axum::routing::delete(recommendations::delete_recommendations))
        .route("/recommendations/{id}", get(recommendations::get_recommendation))
        .route("/insights/{id}", get(insights::get_insight))
        .route("/podcasts/{id}", get(podcasts::get_podcast))
        .merge(generation_routes);

    let storage_root = state.storage.root().to_path_buf();
    let body_limit = state.config.server.max_upload_bytes;

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .nest_service("/storage", ServeDir::new(storage_root))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}
