//! Document entity

use super::status::ProcessingStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub collection_id: String,

    /// Original upload filename
    #[sea_orm(column_type = "Text")]
    pub doc_name: String,

    /// Title found by the extractor
    #[sea_orm(column_type = "Text", nullable)]
    pub doc_title: Option<String>,

    pub doc_size_kb: i64,

    pub total_pages: i32,

    #[sea_orm(column_type = "Text")]
    pub doc_type: String,

    #[sea_orm(column_type = "Text")]
    pub doc_url: String,

    /// Path relative to the storage root
    #[sea_orm(column_type = "Text")]
    pub storage_path: String,

    /// SHA-256 of the uploaded bytes
    pub content_hash: String,

    pub is_processed: String,

    pub is_embedding_created: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub processing_error: Option<String>,

    #[sea_orm(nullable)]
    pub latest_insight_id: Option<String>,

    #[sea_orm(nullable)]
    pub latest_podcast_id: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn processing_status(&self) -> ProcessingStatus {
        ProcessingStatus::from(self.is_processed.as_str())
    }

    pub fn embedding_status(&self) -> ProcessingStatus {
        ProcessingStatus::from(self.is_embedding_created.as_str())
    }

    /// Title to show users: extracted title, else the filename
    pub fn display_title(&self) -> &str {
        self.doc_title.as_deref().unwrap_or(&self.doc_name)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::collection::Entity",
        from = "Column::CollectionId",
        to = "super::collection::Column::Id",
        on_delete = "Cascade"
    )]
    Collection,

    #[sea_orm(has_many = "super::outline_item::Entity")]
    OutlineItems,

    #[sea_orm(has_many = "super::chunk::Entity")]
    Chunks,
}

impl Related<super::collection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Collection.def()
    }
}

impl Related<super::outline_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OutlineItems.def()
    }
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
