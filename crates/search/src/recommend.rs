//! Recommendation engine
//!
//! Text and persona queries share one path:
//! - over-fetch candidates from the embedding index
//! - drop candidates that merely repeat the selection (text mode)
//! - dedupe by section and by vector similarity
//! - format snippets and ask the LLM why each item is useful
//!
//! Every result is stored before it is returned.

use crate::index::{EmbeddingIndex, ScoredChunk};
use crate::store::{RecommendationItem, RecommendationResult, RecommendationStore};
use chrono::Utc;
use docmind_common::config::RecommendationConfig;
use docmind_common::db::models::RecommendationType;
use docmind_common::embeddings::cosine_similarity;
use docmind_common::errors::{AppError, Result};
use docmind_common::llm::{ChatMessage, LanguageModel};
use docmind_common::{ids, metrics, Repository};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

const EXPLANATION_PROMPT: &str = "You are an expert research assistant. Provide a concise explanation \
(max 2 sentences) why this text may be useful to a user.";
const SNIPPET_SENTENCES: usize = 3;
const SNIPPET_FALLBACK_CHARS: usize = 350;
const EXPLANATION_INPUT_CHARS: usize = 2000;
const SELECTION_LENGTH_WINDOW: usize = 50;

/// What the user asked for
#[derive(Debug, Clone)]
pub enum RecommendationQuery {
    Text { selected_text: String },
    Persona { persona: String, job_to_be_done: String },
}

impl RecommendationQuery {
    pub fn kind(&self) -> RecommendationType {
        match self {
            RecommendationQuery::Text { .. } => RecommendationType::Text,
            RecommendationQuery::Persona { .. } => RecommendationType::Persona,
        }
    }

    /// Reject empty inputs before any retrieval
    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str| AppError::Validation {
            message: format!("{} must not be empty", field),
            field: Some(field.to_string()),
        };

        match self {
            RecommendationQuery::Text { selected_text } if selected_text.trim().is_empty() => {
                Err(missing("selected_text"))
            }
            RecommendationQuery::Persona { persona, .. } if persona.trim().is_empty() => Err(missing("persona")),
            RecommendationQuery::Persona { job_to_be_done, .. } if job_to_be_done.trim().is_empty() => {
                Err(missing("job_to_be_done"))
            }
            _ => Ok(()),
        }
    }

    /// Text embedded for retrieval
    pub fn query_text(&self) -> String {
        match self {
            RecommendationQuery::Text { selected_text } => selected_text.trim().to_string(),
            RecommendationQuery::Persona { persona, job_to_be_done } => {
                format!("Persona: {}. Task: {}", persona.trim(), job_to_be_done.trim())
            }
        }
    }

    fn explanation_context(&self) -> String {
        match self {
            RecommendationQuery::Text { selected_text } => {
                format!("The user selected this text: '{}'", selected_text.trim())
            }
            RecommendationQuery::Persona { persona, job_to_be_done } => {
                format!("The user is a {} who needs to: {}", persona.trim(), job_to_be_done.trim())
            }
        }
    }
}

/// First few sentences of a chunk, else a bounded prefix
pub fn extract_snippet(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return text;
    }

    let mut sentences = 0;
    let mut end = None;
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for (i, (pos, c)) in chars.iter().enumerate() {
        if matches!(c, '.' | '!' | '?') && chars.get(i + 1).map_or(true, |(_, next)| *next == ' ') {
            sentences += 1;
            if sentences == SNIPPET_SENTENCES {
                end = Some(pos + c.len_utf8());
                break;
            }
        }
    }

    if sentences > 0 {
        return match end {
            Some(end) => text[..end].to_string(),
            None => text,
        };
    }

    if text.chars().count() > SNIPPET_FALLBACK_CHARS {
        let prefix: String = text.chars().take(SNIPPET_FALLBACK_CHARS).collect();
        format!("{}...", prefix.trim_end())
    } else {
        text
    }
}

pub struct RecommendationEngine {
    index: Arc<EmbeddingIndex>,
    repository: Repository,
    store: RecommendationStore,
    llm: Arc<dyn LanguageModel>,
    settings: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        repository: Repository,
        store: RecommendationStore,
        llm: Arc<dyn LanguageModel>,
        settings: RecommendationConfig,
    ) -> Self {
        Self {
            index,
            repository,
            store,
            llm,
            settings,
        }
    }

    /// Run a query over `collection_ids` and store the result
    #[instrument(skip(self, query, collection_ids), fields(kind = query.kind().as_str(), collections = collection_ids.len()))]
    pub async fn recommend(&self, query: RecommendationQuery, collection_ids: Vec<String>) -> Result<RecommendationResult> {
        let start = Instant::now();
        query.validate()?;

        let num_results = self.settings.num_results.max(1);
        let multiplier = match query.kind() {
            RecommendationType::Text => self.settings.selection_multiplier,
            RecommendationType::Persona => self.settings.persona_multiplier,
        };
        let query_text = query.query_text();

        let candidates = self
            .index
            .query(&query_text, &collection_ids, num_results * multiplier.max(1))
            .await?;
        let selected = self.select(&query, candidates, num_results);

        let items = self.build_items(&query, selected).await?;
        let mut doc_ids: Vec<String> = Vec::new();
        for item in &items {
            if !doc_ids.contains(&item.doc_id) {
                doc_ids.push(item.doc_id.clone());
            }
        }

        let (user_selection_text, persona, job_to_be_done) = match &query {
            RecommendationQuery::Text { selected_text } => (Some(selected_text.clone()), None, None),
            RecommendationQuery::Persona { persona, job_to_be_done } => {
                (None, Some(persona.clone()), Some(job_to_be_done.clone()))
            }
        };

        let result = RecommendationResult {
            recommendation_id: ids::new_id(ids::RECOMMENDATION),
            recommendation_type: query.kind(),
            collection_ids,
            user_selection_text,
            persona,
            job_to_be_done,
            doc_ids,
            items,
            generated_at: Utc::now(),
            latest_insight_id: None,
            latest_podcast_id: None,
        };
        let result = self.store.save(result).await?;

        metrics::record_recommendation(start.elapsed().as_secs_f64(), query.kind().as_str(), result.items.len());
        info!(
            recommendation_id = %result.recommendation_id,
            items = result.items.len(),
            "Recommendation generated"
        );

        Ok(result)
    }

    /// Filter ranked candidates down to at most `limit` distinct items
    fn select(&self, query: &RecommendationQuery, candidates: Vec<ScoredChunk>, limit: usize) -> Vec<ScoredChunk> {
        let selection = match query {
            RecommendationQuery::Text { selected_text } => Some(selected_text.trim()),
            RecommendationQuery::Persona { .. } => None,
        };

        let mut taken: Vec<ScoredChunk> = Vec::new();
        let mut sections: HashSet<(String, String)> = HashSet::new();

        for candidate in candidates {
            if taken.len() >= limit {
                break;
            }

            if let Some(selection) = selection {
                if self.repeats_selection(selection, &candidate) {
                    continue;
                }
            }

            let key = (candidate.document_id.clone(), candidate.section_id.clone());
            if sections.contains(&key) {
                continue;
            }
            if taken
                .iter()
                .any(|t| cosine_similarity(&t.embedding, &candidate.embedding) > self.settings.duplicate_similarity)
            {
                continue;
            }

            sections.insert(key);
            taken.push(candidate);
        }

        taken
    }

    fn repeats_selection(&self, selection: &str, candidate: &ScoredChunk) -> bool {
        let content = candidate.content.trim();
        if content == selection {
            return true;
        }
        let length_gap = content.chars().count().abs_diff(selection.chars().count());
        length_gap <= SELECTION_LENGTH_WINDOW && candidate.score > self.settings.selection_similarity
    }

    async fn build_items(&self, query: &RecommendationQuery, selected: Vec<ScoredChunk>) -> Result<Vec<RecommendationItem>> {
        let mut titles: HashMap<String, String> = HashMap::new();
        for chunk in &selected {
            if !titles.contains_key(&chunk.document_id) {
                let title = self
                    .repository
                    .find_document(&chunk.document_id)
                    .await?
                    .map(|d| d.display_title().to_string())
                    .unwrap_or_default();
                titles.insert(chunk.document_id.clone(), title);
            }
        }

        let snippets: Vec<String> = selected.iter().map(|c| extract_snippet(&c.content)).collect();
        let explanations = if self.settings.explain {
            let context = query.explanation_context();
            join_all(snippets.iter().map(|s| self.explain(&context, s))).await
        } else {
            vec![String::new(); snippets.len()]
        };

        Ok(selected
            .into_iter()
            .zip(snippets)
            .zip(explanations)
            .map(|((chunk, snippet_text), snippet_explanation)| {
                let annotation = (!chunk.quad_points.is_empty()).then(|| {
                    serde_json::json!({
                        "page": chunk.page_number,
                        "quad_points": chunk.quad_points,
                    })
                });
                RecommendationItem {
                    item_id: ids::new_id(ids::RECOMMENDATION_ITEM),
                    document_title: titles.get(&chunk.document_id).cloned().unwrap_or_default(),
                    doc_id: chunk.document_id,
                    section_id: chunk.section_id,
                    section_title: chunk.section_title,
                    page_number: chunk.page_number,
                    snippet_text,
                    snippet_explanation,
                    score: chunk.score,
                    annotation,
                    quad_points: chunk.quad_points,
                }
            })
            .collect())
    }

    async fn explain(&self, context: &str, snippet: &str) -> String {
        let excerpt: String = snippet.chars().take(EXPLANATION_INPUT_CHARS).collect();
        let messages = [
            ChatMessage::system(EXPLANATION_PROMPT),
            ChatMessage::user(format!("{}\n\nText:\n{}", context, excerpt)),
        ];

        match self.llm.complete(&messages).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Explanation generation failed");
                format!("Could not generate explanation: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_takes_three_sentences() {
        let text = "First one. Second one! Third one? Fourth one.";
        assert_eq!(extract_snippet(text), "First one. Second one! Third one?");
        assert_eq!(extract_snippet("Only one sentence."), "Only one sentence.");
        assert_eq!(extract_snippet("Version 1.2 shipped. Done."), "Version 1.2 shipped. Done.");
    }

    #[test]
    fn test_snippet_fallback_is_bounded() {
        let text = "word ".repeat(200);
        let snippet = extract_snippet(&text);
        assert!(snippet.ends_with("..."));
        assert!(snippet.chars().count() <= SNIPPET_FALLBACK_CHARS + 3);
        assert_eq!(extract_snippet("no terminator here"), "no terminator here");
        assert_eq!(extract_snippet("   "), "");
    }

    #[test]
    fn test_validation() {
        let empty_text = RecommendationQuery::Text { selected_text: "  ".into() };
        assert!(empty_text.validate().is_err());

        let no_job = RecommendationQuery::Persona { persona: "Analyst".into(), job_to_be_done: "".into() };
        assert!(no_job.validate().is_err());

        let no_persona = RecommendationQuery::Persona { persona: "".into(), job_to_be_done: "Plan".into() };
        assert!(no_persona.validate().is_err());

        let ok = RecommendationQuery::Persona { persona: "Analyst".into(), job_to_be_done: "Plan".into() };
        assert!(ok.validate().is_ok());
        assert_eq!(ok.query_text(), "Persona: Analyst. Task: Plan");
    }
}
