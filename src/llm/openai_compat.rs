//! OpenAI-compatible HTTP provider.
//!
//! Talks to any `/v1/chat/completions` + `/v1/embeddings` endpoint (the
//! Hugging Face router, LM Studio, vLLM, ...) with an optional bearer token.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::errors::EngineError;

#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(url);
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    fn chat_body(request: &ChatRequest, model_id: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": model_id,
            "messages": request.messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn chat(&self, request: ChatRequest, model_id: &str) -> Result<String, EngineError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::chat_body(&request, model_id, false);

        let res = self
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(EngineError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(EngineError::Internal(format!("chat error: {text}")));
        }

        let payload: Value = res.json().await.map_err(EngineError::internal)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, EngineError>>, EngineError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::chat_body(&request, model_id, true);

        let res = self
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(EngineError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(EngineError::Internal(format!("stream error: {text}")));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        let chunk_str = String::from_utf8_lossy(&bytes);
                        for line in chunk_str.lines() {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if line == "data: [DONE]" {
                                return;
                            }

                            if let Some(data) = line.strip_prefix("data: ") {
                                if let Ok(json) = serde_json::from_str::<Value>(data) {
                                    if let Some(content) =
                                        json["choices"][0]["delta"]["content"].as_str()
                                    {
                                        if !content.is_empty()
                                            && tx.send(Ok(content.to_string())).await.is_err()
                                        {
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(EngineError::internal(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(
        &self,
        inputs: &[String],
        model_id: &str,
    ) -> Result<Vec<Vec<f32>>, EngineError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": model_id,
            "input": inputs,
        });

        let res = self
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(EngineError::Embedding(format!("embed error: {text}")));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| EngineError::Embedding(e.to_string()))?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(EngineError::Embedding(format!(
                "expected {} embeddings, provider returned {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn chat_body_includes_sampling_params_when_set() {
        let mut request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        request.temperature = Some(0.7);
        request.max_tokens = Some(2048);

        let body = OpenAiCompatProvider::chat_body(&request, "test-model", true);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn chat_body_omits_unset_params() {
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        let body = OpenAiCompatProvider::chat_body(&request, "m", false);

        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("http://localhost:8080/".to_string(), String::new());
        assert_eq!(provider.base_url, "http://localhost:8080");
    }
}
