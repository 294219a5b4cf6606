use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::core::errors::EngineError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai_compat")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, EngineError>;

    /// chat completion (streaming)
    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, EngineError>>, EngineError>;

    /// generate embeddings
    async fn embed(&self, inputs: &[String], model_id: &str)
        -> Result<Vec<Vec<f32>>, EngineError>;
}
