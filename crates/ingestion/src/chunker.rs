//! Text chunking module
//!
//! Splits section text into overlapping, size-bounded chunks for embedding.

use crate::errors::IngestionError;
use docmind_common::config::ChunkingSettings;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// Trailing fragments shorter than this are dropped
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 40,
        }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            min_chunk_size: settings.min_chunk_size,
        }
    }
}

/// A text chunk with metadata
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// The chunk content
    pub content: String,
    /// Index of this chunk within its text
    pub index: i32,
    /// Approximate token count
    pub token_count: i32,
    /// Start byte offset in the original text
    pub start_pos: usize,
    /// End byte offset in the original text
    pub end_pos: usize,
}

/// Split text into chunks for embedding.
///
/// A text shorter than `min_chunk_size` still yields one chunk so that short
/// sections stay retrievable; only undersized fragments next to full chunks
/// are dropped.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, IngestionError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let overlap = config.chunk_overlap.min(config.chunk_size.saturating_sub(1));
    let chunk_config = ChunkConfig::new(config.chunk_size.max(1))
        .with_overlap(overlap)
        .map_err(|e| IngestionError::Chunking(e.to_string()))?;
    let splitter = TextSplitter::new(chunk_config);

    let pieces: Vec<(usize, &str)> = splitter.chunk_indices(text).collect();
    let keep_short = pieces.len() == 1;

    let result: Vec<TextChunk> = pieces
        .into_iter()
        .filter(|(_, piece)| keep_short || piece.chars().count() >= config.min_chunk_size)
        .enumerate()
        .map(|(index, (start_pos, piece))| TextChunk {
            content: piece.to_string(),
            index: index as i32,
            // Rough approximation: ~4 chars per token
            token_count: (piece.len() / 4).max(1) as i32,
            start_pos,
            end_pos: start_pos + piece.len(),
        })
        .collect();

    debug!(
        input_len = text.len(),
        chunk_count = result.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_chunking() {
        let text = "This is a test. ".repeat(100);
        let config = ChunkingConfig {
            chunk_size: 200,
            chunk_overlap: 50,
            min_chunk_size: 50,
        };

        let chunks = chunk_text(&text, &config).unwrap();
        assert!(chunks.len() > 1);

        for (i, chunk) in chunks.iter().enumerate() {
            assert!(chunk.content.chars().count() <= config.chunk_size);
            assert!(chunk.content.len() >= config.min_chunk_size);
            assert_eq!(chunk.index, i as i32);
            assert_eq!(&text[chunk.start_pos..chunk.end_pos], chunk.content);
        }
    }

    #[test]
    fn test_short_text_kept() {
        let chunks = chunk_text("Revenue growth.", &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Revenue growth.");
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = "Sentence one. Sentence two. Sentence three. Sentence four. Sentence five.";
        let config = ChunkingConfig {
            chunk_size: 30,
            chunk_overlap: 10,
            min_chunk_size: 5,
        };

        let a = chunk_text(text, &config).unwrap();
        let b = chunk_text(text, &config).unwrap();
        assert!(a.len() >= 2);
        assert_eq!(
            a.iter().map(|c| &c.content).collect::<Vec<_>>(),
            b.iter().map(|c| &c.content).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("   ", &ChunkingConfig::default()).unwrap().is_empty());
    }
}
