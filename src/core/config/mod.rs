pub mod paths;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use paths::AppPaths;

use crate::chunker::ChunkerConfig;
use crate::core::errors::EngineError;

/// Engine configuration. Every field has a serde default so a partial
/// `config.yml` is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunking: ChunkerConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Embedding dimension of the configured model.
    pub dimension: usize,
    /// Chunks returned per query.
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible endpoint base URL.
    pub base_url: String,
    /// Bearer token, empty for unauthenticated local servers.
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub google_api_key: String,
    pub google_engine_id: String,
    /// Results requested from the web-search provider.
    pub max_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            top_k: 3,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.huggingface.co".to_string(),
            api_key: String::new(),
            chat_model: "meta-llama/Llama-3.3-70B-Instruct".to_string(),
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            google_api_key: String::new(),
            google_engine_id: String::new(),
            max_results: 3,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkerConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file, falling back to defaults when the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&raw)
            .map_err(|e| EngineError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.chunking.validate()?;
        if self.retrieval.dimension == 0 {
            return Err(EngineError::Config("embedding dimension must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.dimension, 384);
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let mut config = EngineConfig::default();
        config.chunking.chunk_size = 50;
        config.chunking.overlap = 50;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn load_partial_yaml_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yml");
        std::fs::write(&path, "retrieval:\n  top_k: 5\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.chunking.chunk_size, 500);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = EngineConfig::load(Path::new("/nonexistent/config.yml")).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
    }
}
