//! Insight generation
//!
//! Asks the LLM for a JSON array of categorized insights over a source's text
//! and parses the reply strictly. Whatever goes wrong between the prompt and
//! a non-empty item list is recorded as a single `generation_error` item
//! instead of failing the request.

use crate::context::{load_source, truncate_chars, Source, SourceMaterial};
use chrono::{DateTime, Utc};
use docmind_common::db::models::{Insight, SourceType};
use docmind_common::errors::{AppError, Result};
use docmind_common::llm::{ChatMessage, LanguageModel};
use docmind_common::{metrics, Repository};
use docmind_search::RecommendationStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

pub const KEY_INSIGHTS: &str = "Key insights";
pub const DID_YOU_KNOW: &str = "Did you know?";
pub const CONTRADICTIONS: &str = "Contradictions / counterpoints";
pub const CONNECTIONS: &str = "Inspirations or connections across docs";
pub const GENERATION_ERROR: &str = "generation_error";

pub const INSIGHT_TYPES: [&str; 4] = [KEY_INSIGHTS, DID_YOU_KNOW, CONTRADICTIONS, CONNECTIONS];

const RAW_EXCERPT_CHARS: usize = 500;
const MAX_SENTENCES: usize = 2;

const SYSTEM_PROMPT: &str = r#"You are an expert analyst. Based on the provided text, generate a JSON array of high-level insights. Each insight object in the array must have a 'type', 'data', and 'priority' field.
The 'type' field must be one of the following exact values:
- "Key insights"
- "Did you know?"
- "Contradictions / counterpoints"
- "Inspirations or connections across docs"

The 'data' field should contain the actual insight text, limited to a maximum of two concise sentences.
The 'priority' field should be an integer, where lower numbers indicate higher priority (e.g., 1 for most important).

Generate at least one insight. For each of the four types, if applicable, provide one entry. If a type is not applicable, you can omit it. Ensure the output is a valid JSON array."#;

/// One categorized insight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    pub priority: i64,
}

impl InsightItem {
    pub fn generation_error(message: impl Into<String>) -> Self {
        Self {
            kind: GENERATION_ERROR.to_string(),
            data: message.into(),
            priority: 1,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == GENERATION_ERROR
    }
}

/// Stored insight as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightView {
    pub insight_id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub items: Vec<InsightItem>,
    pub generated_at: DateTime<Utc>,
}

impl InsightView {
    pub fn from_model(model: Insight) -> Result<Self> {
        Ok(Self {
            source_type: parse_source_type(&model.source_type),
            items: serde_json::from_value(model.items)?,
            insight_id: model.id,
            source_id: model.source_id,
            generated_at: model.generated_at.with_timezone(&Utc),
        })
    }

    /// Item texts joined one per line
    pub fn text(&self) -> String {
        self.items
            .iter()
            .filter(|i| !i.is_error())
            .map(|i| i.data.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn parse_source_type(value: &str) -> SourceType {
    match value {
        "document" => SourceType::Document,
        "recommendation" => SourceType::Recommendation,
        _ => SourceType::Collection,
    }
}

/// Remove a surrounding Markdown code fence, with or without a language tag
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    match body.find('\n') {
        Some(newline) if body[..newline].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            body[newline + 1..].trim()
        }
        _ => body.trim(),
    }
}

/// Keep at most `max` sentences; a sentence ends at `.`, `!` or `?` followed by whitespace
pub fn first_sentences(text: &str, max: usize) -> String {
    let text = text.trim();
    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |(_, next)| next.is_whitespace()) {
            count += 1;
            if count == max {
                return text[..pos + c.len_utf8()].to_string();
            }
        }
    }
    text.to_string()
}

#[derive(Deserialize)]
struct RawInsight {
    #[serde(rename = "type")]
    kind: String,
    data: String,
    priority: i64,
}

/// Parse an LLM reply into insight items.
///
/// Unknown types, empty data and repeated types are dropped. Items are
/// ordered by priority, ties keeping reply order.
pub fn parse_insights(raw: &str) -> std::result::Result<Vec<InsightItem>, String> {
    let json = strip_code_fences(raw);
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| format!("reply is not JSON: {}", e))?;
    let serde_json::Value::Array(entries) = value else {
        return Err("reply is not a JSON array".to_string());
    };

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for entry in entries {
        let Ok(raw) = serde_json::from_value::<RawInsight>(entry) else {
            warn!("Skipping malformed insight item");
            continue;
        };
        let kind = raw.kind.trim();
        let data = first_sentences(&raw.data, MAX_SENTENCES);
        if !INSIGHT_TYPES.contains(&kind) || data.is_empty() || !seen.insert(kind.to_string()) {
            continue;
        }
        items.push(InsightItem {
            kind: kind.to_string(),
            data,
            priority: raw.priority,
        });
    }

    if items.is_empty() {
        return Err("no valid insights after filtering".to_string());
    }
    items.sort_by_key(|i| i.priority);
    Ok(items)
}

pub struct InsightGenerator {
    repository: Repository,
    store: RecommendationStore,
    llm: Arc<dyn LanguageModel>,
}

impl InsightGenerator {
    pub fn new(repository: Repository, store: RecommendationStore, llm: Arc<dyn LanguageModel>) -> Self {
        Self { repository, store, llm }
    }

    /// Generate, store and link a new insight for `source`
    #[instrument(skip(self), fields(source_type = %source.source_type(), source_id = %source.id()))]
    pub async fn generate(&self, source: Source) -> Result<InsightView> {
        let material = load_source(&self.repository, &self.store, &source).await?;
        self.generate_from(&material).await
    }

    /// Generate from already loaded material
    pub async fn generate_from(&self, material: &SourceMaterial) -> Result<InsightView> {
        let start = Instant::now();
        let source = &material.source;

        let items = if material.is_empty() {
            vec![InsightItem::generation_error(format!(
                "No content available for {} {}",
                source.source_type(),
                source.id()
            ))]
        } else {
            self.ask(&material.text).await
        };
        let success = !items.iter().any(InsightItem::is_error);

        let insight = self
            .repository
            .insert_insight(source.source_type(), source.id(), serde_json::to_value(&items)?)
            .await?;
        let previous = self
            .repository
            .set_latest_insight(source.source_type(), source.id(), &insight.id)
            .await?;
        if let Some(previous) = previous.filter(|p| *p != insight.id) {
            self.repository.delete_insight(&previous).await?;
        }

        metrics::record_generation("insight", start.elapsed().as_secs_f64(), success);
        info!(insight_id = %insight.id, items = items.len(), success, "Insight generated");

        InsightView::from_model(insight)
    }

    pub async fn get(&self, id: &str) -> Result<InsightView> {
        let insight = self
            .repository
            .find_insight(id)
            .await?
            .ok_or_else(|| AppError::InsightNotFound { id: id.to_string() })?;
        InsightView::from_model(insight)
    }

    async fn ask(&self, context: &str) -> Vec<InsightItem> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Here is the text:\n\n---\n\n{}\n\n---\n\nGenerate insights based on this text.",
                context
            )),
        ];

        let reply = match self.llm.complete(&messages).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Insight generation failed");
                return vec![InsightItem::generation_error(format!("Insight generation failed: {}", e))];
            }
        };

        parse_insights(&reply).unwrap_or_else(|reason| {
            warn!(reason = %reason, "Insight reply rejected");
            vec![InsightItem::generation_error(format!(
                "Failed to parse structured insights ({}). Raw response: {}",
                reason,
                truncate_chars(reply.trim(), RAW_EXCERPT_CHARS)
            ))]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  [1]  "), "[1]");
        assert_eq!(strip_code_fences("```[1]```"), "[1]");
    }

    #[test]
    fn test_first_sentences() {
        assert_eq!(first_sentences("One. Two! Three?", 2), "One. Two!");
        assert_eq!(first_sentences("Pi is 3.14 roughly. Yes.", 1), "Pi is 3.14 roughly.");
        assert_eq!(first_sentences("No terminator", 2), "No terminator");
    }

    #[test]
    fn test_parse_filters_dedupes_and_sorts() {
        let raw = r#"```json
[
  {"type": "Did you know?", "data": "Fact one. Fact two. Fact three.", "priority": 2},
  {"type": "Key insights", "data": "Main point.", "priority": 1},
  {"type": "Key insights", "data": "Duplicate.", "priority": 0},
  {"type": "Trivia", "data": "Unknown type.", "priority": 1},
  {"type": "Contradictions / counterpoints", "data": "   ", "priority": 3},
  {"type": "Inspirations or connections across docs", "priority": 4}
]
```"#;
        let items = parse_insights(raw).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, KEY_INSIGHTS);
        assert_eq!(items[0].data, "Main point.");
        assert_eq!(items[1].kind, DID_YOU_KNOW);
        assert_eq!(items[1].data, "Fact one. Fact two.");
    }

    #[test]
    fn test_parse_rejects_bad_replies() {
        assert!(parse_insights("not json").is_err());
        assert!(parse_insights(r#"{"type": "Key insights"}"#).is_err());
        assert!(parse_insights("[]").is_err());
        assert!(parse_insights(r#"[{"type": "Other", "data": "x", "priority": 1}]"#).is_err());
    }

    #[test]
    fn test_item_serializes_with_type_key() {
        let value = serde_json::to_value(InsightItem::generation_error("boom")).unwrap();
        assert_eq!(value["type"], "generation_error");
        assert_eq!(value["priority"], 1);
    }
}
