use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("embedding provider error: {0}")]
    Embedding(String),
    #[error("index corrupted: {0}")]
    Corruption(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        EngineError::Internal(err.to_string())
    }
}
