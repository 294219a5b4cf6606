//! Mock providers shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::errors::EngineError;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatMessage, ChatRequest};
use crate::search::{SearchResult, WebSearchProvider};

pub const DIM: usize = 16;

/// Deterministic bag-of-words embedding: identical texts map to identical
/// vectors, so exact-text queries retrieve their own chunk at distance zero.
pub fn hash_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dim];
    for word in text.to_lowercase().split_whitespace() {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        vector[(hash % dim as u64) as usize] += 1.0;
    }

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

pub enum StreamBehavior {
    Fragments(Vec<String>),
    FailInvoke,
    FailMidStream { prefix: Vec<String> },
}

pub struct MockLlm {
    stream: StreamBehavior,
    fail_embed: bool,
    embed_count: AtomicUsize,
    stream_count: AtomicUsize,
    last_request: Mutex<Option<ChatRequest>>,
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::streaming(vec!["Mock ", "answer."])
    }
}

impl MockLlm {
    pub fn streaming(fragments: Vec<&str>) -> Self {
        Self {
            stream: StreamBehavior::Fragments(
                fragments.into_iter().map(str::to_string).collect(),
            ),
            fail_embed: false,
            embed_count: AtomicUsize::new(0),
            stream_count: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing_embed() -> Self {
        let mut mock = Self::default();
        mock.fail_embed = true;
        mock
    }

    pub fn failing_invoke() -> Self {
        let mut mock = Self::default();
        mock.stream = StreamBehavior::FailInvoke;
        mock
    }

    pub fn failing_mid_stream(prefix: Vec<&str>) -> Self {
        let mut mock = Self::default();
        mock.stream = StreamBehavior::FailMidStream {
            prefix: prefix.into_iter().map(str::to_string).collect(),
        };
        mock
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_count.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_count.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_request
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.messages.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, EngineError> {
        *self.last_request.lock().unwrap() = Some(request);
        match &self.stream {
            StreamBehavior::Fragments(fragments) => Ok(fragments.concat()),
            _ => Err(EngineError::Internal("mock chat failure".to_string())),
        }
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        _model_id: &str,
    ) -> Result<mpsc::Receiver<Result<String, EngineError>>, EngineError> {
        self.stream_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);

        let (tx, rx) = mpsc::channel(32);
        match &self.stream {
            StreamBehavior::Fragments(fragments) => {
                let fragments = fragments.clone();
                tokio::spawn(async move {
                    for fragment in fragments {
                        if tx.send(Ok(fragment)).await.is_err() {
                            return;
                        }
                    }
                });
            }
            StreamBehavior::FailInvoke => {
                return Err(EngineError::Internal("mock invoke failure".to_string()));
            }
            StreamBehavior::FailMidStream { prefix } => {
                let prefix = prefix.clone();
                tokio::spawn(async move {
                    for fragment in prefix {
                        if tx.send(Ok(fragment)).await.is_err() {
                            return;
                        }
                    }
                    let _ = tx
                        .send(Err(EngineError::Internal("mock stream failure".to_string())))
                        .await;
                });
            }
        }

        Ok(rx)
    }

    async fn embed(
        &self,
        inputs: &[String],
        _model_id: &str,
    ) -> Result<Vec<Vec<f32>>, EngineError> {
        self.embed_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(EngineError::Embedding("mock embed failure".to_string()));
        }
        Ok(inputs.iter().map(|s| hash_embedding(s, DIM)).collect())
    }
}

pub struct MockWeb {
    results: Vec<SearchResult>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl Default for MockWeb {
    fn default() -> Self {
        Self {
            results: vec![
                SearchResult {
                    title: "Result one".to_string(),
                    url: "https://example.com/one".to_string(),
                    snippet: "First snippet".to_string(),
                },
                SearchResult {
                    title: "Result two".to_string(),
                    url: "https://example.com/two".to_string(),
                    snippet: "Second snippet".to_string(),
                },
            ],
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }
}

impl MockWeb {
    pub fn failing() -> Self {
        let mut mock = Self::default();
        mock.fail = true;
        mock
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearchProvider for MockWeb {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(EngineError::Internal("mock search failure".to_string()));
        }
        let mut results = self.results.clone();
        results.truncate(max_results);
        Ok(results)
    }
}
