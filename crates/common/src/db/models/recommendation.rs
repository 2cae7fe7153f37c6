//! Recommendation entity
//!
//! Items are written once at creation; only the latest insight/podcast
//! pointers change afterwards.

use super::status::RecommendationType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recommendations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub recommendation_type: String,

    /// First requested collection; used for per-collection listing and pruning
    #[sea_orm(nullable)]
    pub collection_id: Option<String>,

    /// All requested collections
    #[sea_orm(column_type = "Json")]
    pub collection_ids: Json,

    #[sea_orm(column_type = "Text", nullable)]
    pub user_selection_text: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub persona: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub job_to_be_done: Option<String>,

    /// Documents that contributed items
    #[sea_orm(column_type = "Json")]
    pub doc_ids: Json,

    /// Serialized `Vec<RecommendationItem>`
    #[sea_orm(column_type = "Json")]
    pub items: Json,

    #[sea_orm(nullable)]
    pub latest_insight_id: Option<String>,

    #[sea_orm(nullable)]
    pub latest_podcast_id: Option<String>,

    pub generated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn kind(&self) -> RecommendationType {
        RecommendationType::from(self.recommendation_type.as_str())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
