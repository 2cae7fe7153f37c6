//! Prefixed opaque identifiers
//!
//! Every id is `{prefix}_{uuid v4 as 32 hex chars}`.

use uuid::Uuid;

pub const COLLECTION: &str = "collection";
pub const DOCUMENT: &str = "doc";
pub const SECTION: &str = "sec";
pub const CHUNK: &str = "chunk";
pub const RECOMMENDATION: &str = "rec";
pub const RECOMMENDATION_ITEM: &str = "item";
pub const INSIGHT: &str = "insight";
pub const PODCAST: &str = "podcast";

/// Generate a new id with the given prefix
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ids_are_unique() {
        let a = new_id(PODCAST);
        let b = new_id(PODCAST);
        assert!(a.starts_with("podcast_"));
        assert_eq!(a.len(), "podcast_".len() + 32);
        assert_ne!(a, b);
    }
}
