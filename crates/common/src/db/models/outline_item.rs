//! Outline item entity: one heading of a document and the text under it

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "outline_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub section_id: String,

    pub document_id: String,

    /// Order within the document outline
    pub position: i32,

    /// H1, H2 or H3
    pub level: String,

    #[sea_orm(column_type = "Text")]
    pub text: String,

    /// 1-based page number
    pub page: i32,

    #[sea_orm(column_type = "Text")]
    pub section_text: String,

    /// Highlight data: `{"quad_points": [[x0,y0,x1,y0,x1,y1,x0,y1], ...]}`
    #[sea_orm(column_type = "Json", nullable)]
    pub annotation: Option<Json>,
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
