//! DocMind search
//!
//! Collection-scoped embedding index, the recommendation engine built on it,
//! and the store that keeps recommendation results addressable by id.

pub mod index;
pub mod recommend;
pub mod store;

pub use index::{EmbeddingIndex, ScoredChunk};
pub use recommend::{extract_snippet, RecommendationEngine, RecommendationQuery};
pub use store::{RecommendationItem, RecommendationResult, RecommendationStore};
