//! Recommendation handlers

use axum::{
    extract::{Path, State},
    Json,
};
use docmind_common::errors::Result;
use docmind_search::{RecommendationQuery, RecommendationResult};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;

/// Recommend sections related to selected text
#[derive(Debug, Deserialize, Validate)]
pub struct TextRecommendationRequest {
    #[validate(length(max = 20000))]
    pub selected_text: String,

    #[serde(default)]
    pub collection_ids: Vec<String>,
}

/// Recommend sections for a persona and the job they need done
#[derive(Debug, Deserialize, Validate)]
pub struct PersonaRecommendationRequest {
    #[serde(default)]
    #[validate(length(max = 500))]
    pub persona: String,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub job_to_be_done: String,

    #[serde(default)]
    pub collection_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRecommendationsRequest {
    pub recommendation_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteRecommendationsResponse {
    pub deleted: u64,
}

pub async fn recommend_text(
    State(state): State<AppState>,
    Json(request): Json<TextRecommendationRequest>,
) -> Result<Json<RecommendationResult>> {
    request.validate()?;

    let query = RecommendationQuery::Text {
        selected_text: request.selected_text,
    };
    Ok(Json(state.recommender.recommend(query, request.collection_ids).await?))
}

pub async fn recommend_persona(
    State(state): State<AppState>,
    Json(request): Json<PersonaRecommendationRequest>,
) -> Result<Json<RecommendationResult>> {
    request.validate()?;

    let query = RecommendationQuery::Persona {
        persona: request.persona,
        job_to_be_done: request.job_to_be_done,
    };
    Ok(Json(state.recommender.recommend(query, request.collection_ids).await?))
}

/// Look up a stored recommendation
pub async fn get_recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecommendationResult>> {
    Ok(Json(state.recommendations.get(&id).await?))
}

/// Live recommendations of a collection, newest first
pub async fn list_recommendations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RecommendationResult>>> {
    state.repository.get_collection(&id).await?;
    Ok(Json(state.recommendations.list(&id).await?))
}

/// Batch delete by id; unknown ids are ignored
pub async fn delete_recommendations(
    State(state): State<AppState>,
    Json(request): Json<DeleteRecommendationsRequest>,
) -> Result<Json<DeleteRecommendationsResponse>> {
    let deleted = state.recommendations.delete(request.recommendation_ids).await?;
    Ok(Json(DeleteRecommendationsResponse { deleted }))
}
