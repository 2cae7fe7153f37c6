//! Podcast synthesis
//!
//! Turns a source into a two-speaker audio episode:
//! 1. build a text context (snippets, aggregated sections, optional insight)
//! 2. ask the LLM for a HOST/GUEST script as JSON
//! 3. synthesize every turn in TTS-sized pieces and stitch the WAV output
//! 4. store the file and link the podcast to its source
//!
//! Failures after the podcast record exists leave it `failed` with a message;
//! the caller still gets the record back.

use crate::audio::AudioStitcher;
use crate::context::{load_source, Source, SourceMaterial};
use crate::insights::{strip_code_fences, InsightGenerator, InsightView};
use chrono::{DateTime, Utc};
use docmind_common::config::{PodcastConfig, SpeechConfig};
use docmind_common::db::models::{Podcast, PodcastStatus, SourceType};
use docmind_common::errors::{AppError, Result};
use docmind_common::llm::{ChatMessage, LanguageModel};
use docmind_common::speech::{split_for_tts, SpeechSynthesizer};
use docmind_common::storage::StoredFile;
use docmind_common::{metrics, FileStorage, Repository};
use docmind_search::{RecommendationResult, RecommendationStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

const SCRIPT_SCHEMA: &str = r#"{
  "script": [
    {"speaker": "HOST or GUEST", "dialogue": "string", "words": "integer", "order": "integer"}
  ],
  "short_description": "string"
}"#;

// ============================================================================
// Request and Script Types
// ============================================================================

/// Podcast request options
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PodcastOptions {
    #[serde(default)]
    pub include_insights: bool,

    #[serde(default = "default_min_duration")]
    #[validate(range(min = 1, message = "min_duration_seconds must be positive"))]
    pub min_duration_seconds: u32,

    #[serde(default = "default_max_duration")]
    #[validate(range(min = 1, message = "max_duration_seconds must be positive"))]
    pub max_duration_seconds: u32,
}

fn default_min_duration() -> u32 {
    120
}

fn default_max_duration() -> u32 {
    240
}

impl Default for PodcastOptions {
    fn default() -> Self {
        Self {
            include_insights: false,
            min_duration_seconds: default_min_duration(),
            max_duration_seconds: default_max_duration(),
        }
    }
}

impl PodcastOptions {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if self.min_duration_seconds > self.max_duration_seconds {
            return Err(AppError::Validation {
                message: "min_duration_seconds must not exceed max_duration_seconds".to_string(),
                field: Some("min_duration_seconds".to_string()),
            });
        }
        Ok(())
    }

    /// Target word range at `words_per_minute`
    pub fn word_range(&self, words_per_minute: u32) -> (u32, u32) {
        let words = |secs: u32| (secs as u64 * words_per_minute as u64 / 60) as u32;
        (words(self.min_duration_seconds), words(self.max_duration_seconds))
    }
}

/// One spoken turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSegment {
    pub speaker: String,
    pub dialogue: String,
    #[serde(default)]
    pub words: u32,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastScript {
    pub script: Vec<ScriptSegment>,
    #[serde(default)]
    pub short_description: Option<String>,
}

/// Parse an LLM reply into an ordered script.
///
/// Turns with empty dialogue are dropped; a script with no turns left is an
/// error. Missing word counts are filled from the dialogue.
pub fn parse_script(raw: &str) -> Result<PodcastScript> {
    let mut parsed: PodcastScript =
        serde_json::from_str(strip_code_fences(raw)).map_err(|e| AppError::LlmError {
            message: format!("Podcast script is not valid JSON: {}", e),
        })?;

    parsed.script.retain(|s| !s.dialogue.trim().is_empty());
    if parsed.script.is_empty() {
        return Err(AppError::LlmError {
            message: "Podcast script is empty".to_string(),
        });
    }

    for segment in &mut parsed.script {
        if segment.words == 0 {
            segment.words = segment.dialogue.split_whitespace().count() as u32;
        }
    }
    parsed.script.sort_by_key(|s| s.order);
    parsed.short_description = parsed
        .short_description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Ok(parsed)
}

/// Voice for a speaker label
pub fn voice_for<'a>(speaker: &str, config: &'a SpeechConfig) -> Result<&'a str> {
    match speaker.trim().to_ascii_uppercase().as_str() {
        "HOST" | "ALEX" => Ok(&config.host_voice),
        "GUEST" | "BEN" => Ok(&config.guest_voice),
        other => Err(AppError::LlmError {
            message: format!("Unknown speaker '{}' in podcast script", other),
        }),
    }
}

// ============================================================================
// API View
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastView {
    pub podcast_id: String,
    pub source_type: String,
    pub source_id: String,
    pub status: PodcastStatus,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub short_description: Option<String>,
    pub transcript: Option<Vec<ScriptSegment>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PodcastView {
    pub fn from_model(model: Podcast) -> Result<Self> {
        let transcript = model.transcript.clone().map(serde_json::from_value).transpose()?;
        Ok(Self {
            status: model.podcast_status(),
            podcast_id: model.id,
            source_type: model.source_type,
            source_id: model.source_id,
            audio_url: model.audio_url,
            duration_seconds: model.duration_seconds,
            short_description: model.short_description,
            transcript,
            error_message: model.error_message,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        })
    }
}

// ============================================================================
// Synthesizer
// ============================================================================

struct Episode {
    audio: StoredFile,
    duration_seconds: f64,
    script: PodcastScript,
}

pub struct PodcastSynthesizer {
    repository: Repository,
    store: RecommendationStore,
    storage: FileStorage,
    llm: Arc<dyn LanguageModel>,
    speech: Arc<dyn SpeechSynthesizer>,
    insights: Arc<InsightGenerator>,
    speech_config: SpeechConfig,
    podcast_config: PodcastConfig,
}

impl PodcastSynthesizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Repository,
        store: RecommendationStore,
        storage: FileStorage,
        llm: Arc<dyn LanguageModel>,
        speech: Arc<dyn SpeechSynthesizer>,
        insights: Arc<InsightGenerator>,
        speech_config: SpeechConfig,
        podcast_config: PodcastConfig,
    ) -> Self {
        Self {
            repository,
            store,
            storage,
            llm,
            speech,
            insights,
            speech_config,
            podcast_config,
        }
    }

    pub async fn get(&self, id: &str) -> Result<PodcastView> {
        let podcast = self
            .repository
            .find_podcast(id)
            .await?
            .ok_or_else(|| AppError::PodcastNotFound { id: id.to_string() })?;
        PodcastView::from_model(podcast)
    }

    /// Produce a podcast for `source`.
    ///
    /// Invalid options and unknown sources are errors and create nothing.
    /// Later failures are recorded on the returned podcast.
    #[instrument(skip(self, options), fields(source_type = %source.source_type(), source_id = %source.id()))]
    pub async fn generate(&self, source: Source, options: PodcastOptions) -> Result<PodcastView> {
        options.check()?;
        let material = load_source(&self.repository, &self.store, &source).await?;

        if let Some(existing) = self.reusable(&material).await? {
            info!(podcast_id = %existing.id, "Reusing completed podcast");
            return PodcastView::from_model(existing);
        }

        let podcast = self.repository.create_podcast(source.source_type(), source.id()).await?;
        self.repository
            .update_podcast_status(&podcast.id, PodcastStatus::Processing, None)
            .await?;

        let start = Instant::now();
        let outcome = match self.produce(&podcast.id, &material, &options).await {
            Ok(episode) => self.finish(&podcast.id, &source, episode).await,
            Err(e) => Err(e),
        };
        let podcast = match outcome {
            Ok(done) => done,
            Err(e) => self.abandon(&podcast.id, e).await?,
        };

        let success = podcast.podcast_status() == PodcastStatus::Completed;
        metrics::record_generation("podcast", start.elapsed().as_secs_f64(), success);
        info!(
            podcast_id = %podcast.id,
            status = %podcast.status,
            duration_seconds = podcast.duration_seconds.unwrap_or_default(),
            "Podcast finished"
        );

        PodcastView::from_model(podcast)
    }

    /// Completed podcast already linked to a recommendation
    async fn reusable(&self, material: &SourceMaterial) -> Result<Option<Podcast>> {
        if material.source.source_type() != SourceType::Recommendation {
            return Ok(None);
        }
        let Some(latest) = &material.latest_podcast_id else {
            return Ok(None);
        };
        Ok(self
            .repository
            .find_podcast(latest)
            .await?
            .filter(|p| p.podcast_status() == PodcastStatus::Completed))
    }

    async fn produce(&self, podcast_id: &str, material: &SourceMaterial, options: &PodcastOptions) -> Result<Episode> {
        let context = self.script_context(material, options).await?;
        let (min_words, max_words) = options.word_range(self.podcast_config.words_per_minute);

        let messages = [
            ChatMessage::system(format!(
                "You are a podcast host and a guest. Create an engaging, narrative-style audio script \
                 summarizing the following {} content. The script should be a dialogue between two distinct \
                 speakers, 'HOST' and 'GUEST'. Do NOT include any intro music cues, host greetings like \
                 'Welcome back', or outro music cues. The total word count for the script should be \
                 approximately {}-{} words. Provide the output as JSON matching this schema:\n\n{}",
                material.source.source_type(),
                min_words,
                max_words,
                SCRIPT_SCHEMA
            )),
            ChatMessage::user(format!(
                "Please create a podcast script from the following information:\n\n---\n{}\n---",
                context
            )),
        ];

        let reply = self.llm.complete(&messages).await?;
        let script = parse_script(&reply)?;
        debug!(podcast_id, turns = script.script.len(), "Podcast script parsed");

        let mut stitcher = AudioStitcher::new();
        for (turn, segment) in script.script.iter().enumerate() {
            let voice = voice_for(&segment.speaker, &self.speech_config)?;
            if turn > 0 {
                stitcher.push_pause(self.podcast_config.pause_millis);
            }
            for piece in split_for_tts(&segment.dialogue, self.speech_config.max_chars) {
                let wav = self.speech.synthesize(&piece, voice).await?;
                stitcher.push_segment(&wav)?;
            }
        }

        let (bytes, duration_seconds) = stitcher.finish()?;
        let audio = self.storage.save_podcast(podcast_id, &bytes).await?;

        Ok(Episode {
            audio,
            duration_seconds,
            script,
        })
    }

    async fn finish(&self, podcast_id: &str, source: &Source, episode: Episode) -> Result<Podcast> {
        let completed = self
            .repository
            .complete_podcast(
                podcast_id,
                episode.audio.url,
                episode.audio.relative_path,
                episode.duration_seconds,
                episode.script.short_description,
                serde_json::to_value(&episode.script.script)?,
            )
            .await?;

        let previous = self
            .repository
            .set_latest_podcast(source.source_type(), source.id(), podcast_id)
            .await?;
        if let Some(previous) = previous.filter(|p| p != podcast_id) {
            if let Err(e) = self.discard(&previous).await {
                warn!(podcast_id = %previous, error = %e, "Failed to remove replaced podcast");
            }
        }

        Ok(completed)
    }

    /// Remove a replaced podcast and its audio
    async fn discard(&self, podcast_id: &str) -> Result<()> {
        if let Some(old) = self.repository.find_podcast(podcast_id).await? {
            if let Some(path) = &old.audio_path {
                self.storage.delete_quietly(path).await;
            }
            self.repository.delete_podcast(&old.id).await?;
            debug!(podcast_id = %old.id, "Replaced previous podcast");
        }
        Ok(())
    }

    /// Record `error` on the podcast and drop any audio written for it.
    ///
    /// When the row itself is gone (its source was deleted meanwhile) the
    /// original error is returned.
    async fn abandon(&self, podcast_id: &str, error: AppError) -> Result<Podcast> {
        warn!(podcast_id, error = %error, "Podcast generation failed");
        self.storage.delete_quietly(&self.storage.podcast_path(podcast_id)).await;

        match self.repository.fail_podcast(podcast_id, error.to_string()).await {
            Ok(failed) => Ok(failed),
            Err(AppError::PodcastNotFound { .. }) => Err(error),
            Err(e) => Err(e),
        }
    }

    async fn script_context(&self, material: &SourceMaterial, options: &PodcastOptions) -> Result<String> {
        let mut context = match &material.recommendation {
            Some(recommendation) => recommendation_context(recommendation)?,
            None => {
                if material.is_empty() {
                    return Err(AppError::Validation {
                        message: format!(
                            "No readable content found for {} {}",
                            material.source.source_type(),
                            material.source.id()
                        ),
                        field: None,
                    });
                }
                material.text.clone()
            }
        };

        if options.include_insights {
            let insight = self.latest_insight(material).await?;
            let text = insight.as_ref().map(InsightView::text).unwrap_or_default();
            if !text.is_empty() {
                context.push_str("\n\nOverall Insight:\n");
                context.push_str(&text);
            }
        }

        Ok(context)
    }

    /// Latest stored insight of the source, generating one when missing
    async fn latest_insight(&self, material: &SourceMaterial) -> Result<Option<InsightView>> {
        if let Some(id) = &material.latest_insight_id {
            if let Some(insight) = self.repository.find_insight(id).await? {
                let view = InsightView::from_model(insight)?;
                if !view.text().is_empty() {
                    return Ok(Some(view));
                }
            }
        }
        debug!(source_id = %material.source.id(), "Generating insight for podcast");
        self.insights.generate_from(material).await.map(Some)
    }
}

fn recommendation_context(recommendation: &RecommendationResult) -> Result<String> {
    if recommendation.items.is_empty() {
        return Err(AppError::Validation {
            message: format!("No snippets found for recommendation {}", recommendation.recommendation_id),
            field: None,
        });
    }

    let mut context = match (&recommendation.persona, &recommendation.job_to_be_done) {
        (Some(persona), Some(job)) => format!("User's persona: '{}'. Task to accomplish: '{}'\n\n", persona, job),
        _ => format!(
            "User's original selection: '{}'\n\n",
            recommendation.user_selection_text.as_deref().unwrap_or_default()
        ),
    };
    context.push_str("Here are the relevant snippets and explanations found in the user's library:\n\n");
    for item in &recommendation.items {
        context.push_str(&format!(
            "- From '{}': {} (Reason: {})\n",
            item.document_title, item.snippet_text, item.snippet_explanation
        ));
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_validation() {
        assert!(PodcastOptions::default().check().is_ok());

        let zero = PodcastOptions {
            min_duration_seconds: 0,
            ..Default::default()
        };
        assert!(matches!(zero.check(), Err(AppError::Validation { .. })));

        let inverted = PodcastOptions {
            min_duration_seconds: 300,
            max_duration_seconds: 200,
            ..Default::default()
        };
        assert!(inverted.check().is_err());

        let options: PodcastOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.min_duration_seconds, 120);
        assert_eq!(options.word_range(150), (300, 600));
    }

    #[test]
    fn test_parse_script_orders_turns() {
        let raw = r#"```json
{"script": [
  {"speaker": "GUEST", "dialogue": "Second turn here.", "words": 3, "order": 2},
  {"speaker": "HOST", "dialogue": "First turn.", "order": 1},
  {"speaker": "HOST", "dialogue": "  ", "words": 0, "order": 3}
], "short_description": " A short chat. "}
```"#;
        let script = parse_script(raw).unwrap();
        assert_eq!(script.script.len(), 2);
        assert_eq!(script.script[0].speaker, "HOST");
        assert_eq!(script.script[0].words, 2);
        assert_eq!(script.script[1].order, 2);
        assert_eq!(script.short_description.as_deref(), Some("A short chat."));
    }

    #[test]
    fn test_parse_script_rejects_bad_replies() {
        assert!(parse_script("Sure! Here is your podcast.").is_err());
        assert!(parse_script(r#"{"script": [], "short_description": "x"}"#).is_err());
        assert!(parse_script(r#"[{"speaker": "HOST"}]"#).is_err());
    }

    #[test]
    fn test_voice_mapping() {
        let config = SpeechConfig {
            host_voice: "alloy".into(),
            guest_voice: "onyx".into(),
            ..SpeechConfig::default()
        };
        assert_eq!(voice_for("HOST", &config).unwrap(), "alloy");
        assert_eq!(voice_for("alex", &config).unwrap(), "alloy");
        assert_eq!(voice_for(" Guest ", &config).unwrap(), "onyx");
        assert_eq!(voice_for("BEN", &config).unwrap(), "onyx");
        assert!(voice_for("NARRATOR", &config).is_err());
    }
}
