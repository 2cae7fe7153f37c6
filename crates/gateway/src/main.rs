//! DocMind API Gateway
//!
//! Binary entry point: loads configuration, wires providers and serves the
//! router until Ctrl-C or SIGTERM.

use anyhow::Context;
use axum::routing::get;
use docmind_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    llm::create_language_model,
    metrics::{self, GENERATION_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
    speech::create_speech_synthesizer,
};
use docmind_gateway::{create_router, AppState};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config);

    info!(
        service = %config.observability.service_name,
        "Starting DocMind API Gateway v{}",
        docmind_common::VERSION
    );

    // Initialize metrics
    let prometheus = install_prometheus()?;
    metrics::register_metrics();

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    db.ensure_schema().await?;
    let repository = Repository::new(db);

    // Providers
    let embedder = create_embedder(&config.embedding)?;
    let llm = create_language_model(&config.llm)?;
    let speech = create_speech_synthesizer(&config.speech)?;
    info!(
        embedding_model = %embedder.model_name(),
        llm_model = %llm.model_name(),
        speech_provider = %speech.provider(),
        "Providers configured"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState::new(config, repository, embedder, llm, speech);
    state.storage.init().await?;

    // Build the router
    let app = create_router(state).route("/metrics", get(move || render_metrics(prometheus.clone())));

    // Start the server
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.observability.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let duration = |name: &str| Matcher::Full(format!("{}_{}_duration_seconds", METRICS_PREFIX, name));

    PrometheusBuilder::new()
        .set_buckets_for_metric(duration("ingestion"), LATENCY_BUCKETS)?
        .set_buckets_for_metric(duration("recommendation"), LATENCY_BUCKETS)?
        .set_buckets_for_metric(duration("embedding"), GENERATION_BUCKETS)?
        .set_buckets_for_metric(duration("generation"), GENERATION_BUCKETS)?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

async fn render_metrics(handle: PrometheusHandle) -> String {
    handle.render()
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
