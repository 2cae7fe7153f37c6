//! Text-to-speech abstraction
//!
//! Every provider returns a complete WAV file per request so segments can be
//! stitched without transcoding:
//! - OpenAI `/audio/speech`
//! - Azure OpenAI TTS deployments
//! - `SilentSpeech`, an offline provider that emits silence sized to the text

use crate::config::SpeechConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Trait for speech synthesis
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice`, returning WAV bytes
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;

    /// Provider name
    fn provider(&self) -> &str;
}

/// Split text into pieces of at most `max_chars` characters.
///
/// Breaks at whitespace; a single token longer than the limit is cut hard.
/// Whitespace runs are normalized to a single space.
pub fn split_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };

        if needed <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
            continue;
        }

        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }

        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > max_chars {
            let rest = chars.split_off(max_chars);
            pieces.push(chars.into_iter().collect());
            chars = rest;
        }
        current = chars.into_iter().collect();
        current_len = current.chars().count();
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[derive(Debug, Clone)]
enum Auth {
    Bearer(String),
    ApiKeyHeader(String),
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// HTTP client for OpenAI-style `/audio/speech` endpoints
pub struct HttpSpeechClient {
    client: reqwest::Client,
    url: String,
    auth: Auth,
    model: String,
    provider: &'static str,
}

impl HttpSpeechClient {
    /// OpenAI TTS
    pub fn openai(config: &SpeechConfig) -> Result<Self> {
        let key = require(config.api_key.clone(), "speech.api_key", "openai")?;
        let base = config
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!("{}/audio/speech", base.trim_end_matches('/')),
            auth: Auth::Bearer(key),
            model: config.model.clone(),
            provider: "openai",
        })
    }

    /// Azure OpenAI TTS; `model` is the deployment name
    pub fn azure(config: &SpeechConfig) -> Result<Self> {
        let key = require(config.api_key.clone(), "speech.api_key", "azure")?;
        let endpoint = require(config.endpoint.clone(), "speech.endpoint", "azure")?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: format!(
                "{}/openai/deployments/{}/audio/speech?api-version={}",
                endpoint.trim_end_matches('/'),
                config.model,
                config.api_version
            ),
            auth: Auth::ApiKeyHeader(key),
            model: config.model.clone(),
            provider: "azure",
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            response_format: "wav",
        };

        let builder = self.client.post(&self.url).json(&request);
        let builder = match &self.auth {
            Auth::Bearer(key) => builder.bearer_auth(key),
            Auth::ApiKeyHeader(key) => builder.header("api-key", key),
        };

        let response = builder.send().await.map_err(|e| AppError::SpeechError {
            message: format!("{} TTS request failed: {}", self.provider, e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SpeechError {
                message: format!("{} TTS error {}: {}", self.provider, status, body),
            });
        }

        let bytes = response.bytes().await.map_err(|e| AppError::SpeechError {
            message: format!("Failed to read TTS audio: {}", e),
        })?;
        Ok(bytes.to_vec())
    }

    fn provider(&self) -> &str {
        self.provider
    }
}

/// Offline synthesizer producing silence at 150 words per minute
pub struct SilentSpeech {
    sample_rate: u32,
}

impl SilentSpeech {
    pub const WORDS_PER_MINUTE: f64 = 150.0;

    pub fn new() -> Self {
        Self { sample_rate: 16_000 }
    }

    /// Duration of the silence emitted for `text`
    pub fn duration_for(text: &str) -> Duration {
        let words = text.split_whitespace().count() as f64;
        Duration::from_secs_f64((words * 60.0 / Self::WORDS_PER_MINUTE).max(0.25))
    }
}

impl Default for SilentSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesizer for SilentSpeech {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(AppError::SpeechError {
                message: "Text cannot be empty".to_string(),
            });
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let samples = (Self::duration_for(text).as_secs_f64() * self.sample_rate as f64).round() as u64;

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for _ in 0..samples {
                writer.write_sample(0i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    fn provider(&self) -> &str {
        "local"
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn require(value: Option<String>, key: &str, provider: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Configuration {
            message: format!("{} is required for the {} speech provider", key, provider),
        })
}

/// Create a speech synthesizer based on configuration
pub fn create_speech_synthesizer(config: &SpeechConfig) -> Result<Arc<dyn SpeechSynthesizer>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(HttpSpeechClient::openai(config)?)),
        "azure" => Ok(Arc::new(HttpSpeechClient::azure(config)?)),
        "local" | "mock" => Ok(Arc::new(SilentSpeech::new())),
        other => Err(AppError::Configuration {
            message: format!(
                "Unknown speech provider '{}'; expected openai, azure or local",
                other
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_limit_and_keeps_words() {
        let text = "alpha beta   gamma delta epsilon zeta eta theta";
        let pieces = split_for_tts(text, 12);

        assert!(pieces.iter().all(|p| p.chars().count() <= 12));
        let rejoined: Vec<&str> = pieces.iter().flat_map(|p| p.split_whitespace()).collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);
    }

    #[test]
    fn test_split_cuts_oversized_token() {
        let pieces = split_for_tts("abcdefghij xy", 4);
        assert_eq!(pieces, vec!["abcd", "efgh", "ij", "xy"]);
    }

    #[test]
    fn test_short_text_is_single_piece() {
        assert_eq!(split_for_tts(" hello world ", 3000), vec!["hello world"]);
        assert!(split_for_tts("   ", 10).is_empty());
    }

    #[tokio::test]
    async fn test_silent_speech_duration() {
        let speech = SilentSpeech::new();
        let bytes = speech.synthesize("one two three four five", "alloy").await.unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let secs = reader.duration() as f64 / reader.spec().sample_rate as f64;
        assert!((secs - 2.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_silent_speech_rejects_empty() {
        assert!(SilentSpeech::new().synthesize("  ", "alloy").await.is_err());
    }

    #[test]
    fn test_factory() {
        assert!(create_speech_synthesizer(&SpeechConfig::default()).is_ok());

        let azure = SpeechConfig {
            provider: "azure".to_string(),
            api_key: Some("k".to_string()),
            endpoint: None,
            ..SpeechConfig::default()
        };
        assert!(matches!(
            create_speech_synthesizer(&azure),
            Err(AppError::Configuration { .. })
        ));
    }
}
