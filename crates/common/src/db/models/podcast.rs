//! Podcast entity

use super::status::PodcastStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "podcasts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub source_type: String,

    pub source_id: String,

    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub audio_url: Option<String>,

    /// Path relative to the storage root
    #[sea_orm(column_type = "Text", nullable)]
    pub audio_path: Option<String>,

    #[sea_orm(nullable)]
    pub duration_seconds: Option<f64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub short_description: Option<String>,

    /// Serialized `Vec<ScriptSegment>`
    #[sea_orm(column_type = "Json", nullable)]
    pub transcript: Option<Json>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn podcast_status(&self) -> PodcastStatus {
        PodcastStatus::from(self.status.as_str())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
