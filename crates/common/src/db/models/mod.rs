//! SeaORM entity models
//!
//! Database entities for DocMind

mod chunk;
mod collection;
mod document;
mod insight;
mod outline_item;
mod podcast;
mod recommendation;
mod status;

pub use status::{PodcastStatus, ProcessingStatus, RecommendationType, SourceType};

pub use collection::{
    Entity as CollectionEntity,
    Model as Collection,
    ActiveModel as CollectionActiveModel,
    Column as CollectionColumn,
};

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
};

pub use outline_item::{
    Entity as OutlineItemEntity,
    Model as OutlineItem,
    ActiveModel as OutlineItemActiveModel,
    Column as OutlineItemColumn,
};

pub use chunk::{
    Entity as ChunkEntity,
    Model as Chunk,
    ActiveModel as ChunkActiveModel,
    Column as ChunkColumn,
};

pub use recommendation::{
    Entity as RecommendationEntity,
    Model as Recommendation,
    ActiveModel as RecommendationActiveModel,
    Column as RecommendationColumn,
};

pub use insight::{
    Entity as InsightEntity,
    Model as Insight,
    ActiveModel as InsightActiveModel,
    Column as InsightColumn,
};

pub use podcast::{
    Entity as PodcastEntity,
    Model as Podcast,
    ActiveModel as PodcastActiveModel,
    Column as PodcastColumn,
};
