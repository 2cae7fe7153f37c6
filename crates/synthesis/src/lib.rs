//! DocMind synthesis
//!
//! Generated artifacts over collections, documents and recommendations:
//! - categorized insights from the LLM
//! - two-speaker podcasts rendered through a speech provider

pub mod audio;
pub mod context;
pub mod insights;
pub mod podcast;

pub use audio::AudioStitcher;
pub use context::{load_source, Source, SourceMaterial, MAX_CONTEXT_CHARS};
pub use insights::{InsightGenerator, InsightItem, InsightView};
pub use podcast::{PodcastOptions, PodcastScript, PodcastSynthesizer, PodcastView, ScriptSegment};
