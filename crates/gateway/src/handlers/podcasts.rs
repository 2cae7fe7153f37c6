//! Podcast handlers
//!
//! Generation runs inside the request. A podcast that fails after it was
//! created is still returned with 200; its `status` and `error_message`
//! describe the failure.

use axum::{
    extract::{Path, State},
    Json,
};
use docmind_common::errors::Result;
use docmind_synthesis::{PodcastOptions, PodcastView, Source};

use crate::AppState;

async fn generate(state: &AppState, source: Source, options: Option<Json<PodcastOptions>>) -> Result<Json<PodcastView>> {
    let options = options.map(|Json(o)| o).unwrap_or_default();
    Ok(Json(state.podcasts.generate(source, options).await?))
}

pub async fn from_recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    options: Option<Json<PodcastOptions>>,
) -> Result<Json<PodcastView>> {
    generate(&state, Source::Recommendation(id), options).await
}

pub async fn from_collection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    options: Option<Json<PodcastOptions>>,
) -> Result<Json<PodcastView>> {
    generate(&state, Source::Collection(id), options).await
}

pub async fn from_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    options: Option<Json<PodcastOptions>>,
) -> Result<Json<PodcastView>> {
    generate(&state, Source::Document(id), options).await
}

pub async fn get_podcast(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<PodcastView>> {
    Ok(Json(state.podcasts.get(&id).await?))
}
