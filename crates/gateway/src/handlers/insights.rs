//! Insight handlers

use axum::{
    extract::{Path, State},
    Json,
};
use docmind_common::errors::{AppError, Result};
use docmind_synthesis::{InsightView, Source};
use serde::Deserialize;

use crate::AppState;

/// Exactly one source must be given
#[derive(Debug, Default, Deserialize)]
pub struct CreateInsightRequest {
    pub collection_id: Option<String>,
    pub document_id: Option<String>,
    pub recommendation_id: Option<String>,
}

impl CreateInsightRequest {
    pub fn source(self) -> Result<Source> {
        match (self.collection_id, self.document_id, self.recommendation_id) {
            (Some(id), None, None) => Ok(Source::Collection(id)),
            (None, Some(id), None) => Ok(Source::Document(id)),
            (None, None, Some(id)) => Ok(Source::Recommendation(id)),
            _ => Err(AppError::Validation {
                message: "Exactly one of collection_id, document_id or recommendation_id is required".to_string(),
                field: None,
            }),
        }
    }
}

/// Generate a new insight for a source
pub async fn create_insight(
    State(state): State<AppState>,
    Json(request): Json<CreateInsightRequest>,
) -> Result<Json<InsightView>> {
    let source = request.source()?;
    Ok(Json(state.insights.generate(source).await?))
}

pub async fn get_insight(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<InsightView>> {
    Ok(Json(state.insights.get(&id).await?))
}
