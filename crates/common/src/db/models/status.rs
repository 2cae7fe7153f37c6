//! Status and kind enums stored as text columns

use serde::{Deserialize, Serialize};
use std::fmt;

/// Extraction / embedding pipeline status for a document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Success,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Success => "success",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl From<&str> for ProcessingStatus {
    fn from(s: &str) -> Self {
        match s {
            "success" => ProcessingStatus::Success,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Pending,
        }
    }
}

impl From<ProcessingStatus> for String {
    fn from(status: ProcessingStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Podcast lifecycle
///
/// `pending -> processing -> completed | failed`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodcastStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PodcastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodcastStatus::Pending => "pending",
            PodcastStatus::Processing => "processing",
            PodcastStatus::Completed => "completed",
            PodcastStatus::Failed => "failed",
        }
    }

    /// Check if the podcast is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, PodcastStatus::Completed | PodcastStatus::Failed)
    }
}

impl From<&str> for PodcastStatus {
    fn from(s: &str) -> Self {
        match s {
            "processing" => PodcastStatus::Processing,
            "completed" => PodcastStatus::Completed,
            "failed" => PodcastStatus::Failed,
            _ => PodcastStatus::Pending,
        }
    }
}

impl From<PodcastStatus> for String {
    fn from(status: PodcastStatus) -> Self {
        status.as_str().to_string()
    }
}

/// What an insight or podcast was generated from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Collection,
    Document,
    Recommendation,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Collection => "collection",
            SourceType::Document => "document",
            SourceType::Recommendation => "recommendation",
        }
    }
}

impl From<SourceType> for String {
    fn from(source: SourceType) -> Self {
        source.as_str().to_string()
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a recommendation query was expressed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Text,
    Persona,
}

impl RecommendationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::Text => "text",
            RecommendationType::Persona => "persona",
        }
    }
}

impl From<&str> for RecommendationType {
    fn from(s: &str) -> Self {
        match s {
            "persona" => RecommendationType::Persona,
            _ => RecommendationType::Text,
        }
    }
}

impl From<RecommendationType> for String {
    fn from(kind: RecommendationType) -> Self {
        kind.as_str().to_string()
    }
}
