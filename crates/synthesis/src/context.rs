//! Source material for generation
//!
//! Insights and podcasts are generated from exactly one source: a collection,
//! a document or a stored recommendation. This module resolves the source,
//! aggregates its text and reports its "latest artifact" pointers.

use docmind_common::db::models::SourceType;
use docmind_common::errors::Result;
use docmind_common::Repository;
use docmind_search::{RecommendationResult, RecommendationStore};
use tracing::debug;

/// Upper bound on aggregated context sent to the LLM
pub const MAX_CONTEXT_CHARS: usize = 16_000;

/// What an insight or podcast is generated from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Collection(String),
    Document(String),
    Recommendation(String),
}

impl Source {
    pub fn source_type(&self) -> SourceType {
        match self {
            Source::Collection(_) => SourceType::Collection,
            Source::Document(_) => SourceType::Document,
            Source::Recommendation(_) => SourceType::Recommendation,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Source::Collection(id) | Source::Document(id) | Source::Recommendation(id) => id,
        }
    }
}

/// A resolved source with its aggregated text
#[derive(Debug, Clone)]
pub struct SourceMaterial {
    pub source: Source,
    /// Aggregated text, at most `MAX_CONTEXT_CHARS` characters
    pub text: String,
    pub latest_insight_id: Option<String>,
    pub latest_podcast_id: Option<String>,
    /// Present for recommendation sources
    pub recommendation: Option<RecommendationResult>,
}

impl SourceMaterial {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Resolve `source`; unknown or expired ids are not-found errors
pub async fn load_source(
    repository: &Repository,
    store: &RecommendationStore,
    source: &Source,
) -> Result<SourceMaterial> {
    let material = match source {
        Source::Collection(id) => {
            let collection = repository.get_collection(id).await?;
            let mut parts = Vec::new();
            for document in repository.list_documents(id).await? {
                let content = section_text(repository, &document.id).await?;
                if content.trim().is_empty() {
                    continue;
                }
                parts.push(format!("Document: {}\nContent: {}", document.display_title(), content));
            }
            SourceMaterial {
                source: source.clone(),
                text: parts.join("\n\n"),
                latest_insight_id: collection.latest_insight_id,
                latest_podcast_id: collection.latest_podcast_id,
                recommendation: None,
            }
        }
        Source::Document(id) => {
            let document = repository.get_document(id).await?;
            SourceMaterial {
                source: source.clone(),
                text: section_text(repository, id).await?,
                latest_insight_id: document.latest_insight_id,
                latest_podcast_id: document.latest_podcast_id,
                recommendation: None,
            }
        }
        Source::Recommendation(id) => {
            let recommendation = store.get(id).await?;
            let text = recommendation
                .items
                .iter()
                .map(|item| format!("Snippet from '{}': {}", item.document_title, item.snippet_text))
                .collect::<Vec<_>>()
                .join("\n\n");
            SourceMaterial {
                source: source.clone(),
                text,
                latest_insight_id: recommendation.latest_insight_id.clone(),
                latest_podcast_id: recommendation.latest_podcast_id.clone(),
                recommendation: Some(recommendation),
            }
        }
    };

    debug!(
        source_type = %source.source_type(),
        source_id = %source.id(),
        chars = material.text.chars().count(),
        "Source material loaded"
    );

    Ok(SourceMaterial {
        text: truncate_chars(&material.text, MAX_CONTEXT_CHARS),
        ..material
    })
}

async fn section_text(repository: &Repository, document_id: &str) -> Result<String> {
    Ok(repository
        .outline_items(document_id)
        .await?
        .into_iter()
        .map(|item| item.section_text)
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
