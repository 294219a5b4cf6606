//! Word-window chunking.
//!
//! Splits extracted text into overlapping fixed-size word windows, the unit
//! of embedding and retrieval.

use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Window size in words.
    pub chunk_size: usize,
    /// Overlap between consecutive windows, in words.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

impl ChunkerConfig {
    /// The stride `chunk_size - overlap` must stay positive; anything else
    /// is a configuration error, not a document error.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            return Err(EngineError::Config("chunk_size must be positive".to_string()));
        }
        if self.overlap >= self.chunk_size {
            return Err(EngineError::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Split text into overlapping word windows, each rejoined with single
/// spaces. Empty text yields no chunks; text shorter than one window yields
/// exactly one chunk.
pub fn chunk(text: &str, config: &ChunkerConfig) -> Result<Vec<String>, EngineError> {
    config.validate()?;

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let step = config.chunk_size - config.overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + config.chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = chunk("", &ChunkerConfig::default()).unwrap();
        assert!(chunks.is_empty());

        let chunks = chunk("   \n\t  ", &ChunkerConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_text_yields_one_chunk() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk(text, &ChunkerConfig::default()).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let config = ChunkerConfig {
            chunk_size: 4,
            overlap: 2,
        };
        let chunks = chunk("a b c d e f g h", &config).unwrap();

        assert_eq!(chunks[0], "a b c d");
        assert_eq!(chunks[1], "c d e f");
        assert_eq!(chunks[2], "e f g h");
    }

    #[test]
    fn trailing_partial_window_is_kept() {
        let config = ChunkerConfig {
            chunk_size: 4,
            overlap: 1,
        };
        let chunks = chunk("a b c d e", &config).unwrap();

        assert_eq!(chunks, vec!["a b c d", "d e"]);
    }

    #[test]
    fn whitespace_runs_collapse_to_single_spaces() {
        let chunks = chunk("a   b\n\nc\td", &ChunkerConfig::default()).unwrap();
        assert_eq!(chunks, vec!["a b c d"]);
    }

    #[test]
    fn overlap_at_or_above_chunk_size_is_rejected() {
        let config = ChunkerConfig {
            chunk_size: 50,
            overlap: 50,
        };
        assert!(matches!(
            chunk("some text", &config),
            Err(EngineError::Config(_))
        ));

        let config = ChunkerConfig {
            chunk_size: 50,
            overlap: 60,
        };
        assert!(matches!(
            chunk("some text", &config),
            Err(EngineError::Config(_))
        ));
    }
}
