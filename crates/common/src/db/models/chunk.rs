//! Chunk entity: an embedded span of section text

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chunks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub document_id: String,

    pub collection_id: String,

    pub section_id: String,

    #[sea_orm(column_type = "Text")]
    pub section_title: String,

    pub page_number: i32,

    /// Order of this chunk within its document
    pub chunk_index: i32,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub token_count: i32,

    /// List of 8-float quads for highlighting
    #[sea_orm(column_type = "Json")]
    pub quad_points: Json,

    /// Embedding vector as a JSON array of floats
    #[sea_orm(column_type = "Json")]
    pub embedding: Json,

    /// Model that produced `embedding`
    pub embedding_model: String,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Decode the stored embedding vector
    pub fn vector(&self) -> Vec<f32> {
        serde_json::from_value(self.embedding.clone()).unwrap_or_default()
    }

    /// Decode the stored quads
    pub fn quads(&self) -> Vec<Vec<f32>> {
        serde_json::from_value(self.quad_points.clone()).unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    Document,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
