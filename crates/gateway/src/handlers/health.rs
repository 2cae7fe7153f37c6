//! Liveness and readiness probes

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::future::Future;
use std::time::Instant;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub embedding_model: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub checks: ReadyChecks,
}

#[derive(Serialize)]
pub struct ReadyChecks {
    pub database: Probe,
    pub storage: Probe,
}

/// Outcome of one dependency probe
#[derive(Serialize)]
pub struct Probe {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Probe {
    async fn run<F, E>(check: F) -> Self
    where
        F: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        match check.await {
            Ok(()) => Self {
                status: "up",
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => Self {
                status: "down",
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Always healthy while the process serves requests
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: docmind_common::VERSION,
        embedding_model: state.index.model_name().to_string(),
    })
}

/// Ready once the database answers and the storage root exists
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = Probe::run(state.repository.ping()).await;
    let storage = Probe::run(async {
        let metadata = tokio::fs::metadata(state.storage.root()).await?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "storage root is not a directory"))
        }
    })
    .await;

    let ready = database.is_up() && storage.is_up();
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(ReadyResponse {
            status: if ready { "ready" } else { "not_ready" },
            checks: ReadyChecks { database, storage },
        }),
    )
}
