//! Web search fallback.
//!
//! Used only when the user has confirmed a web search; failures are
//! recovered by the answer generator, never surfaced to the end user.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::SearchConfig;
use crate::core::errors::EngineError;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError>;
}

/// Google Custom Search when configured, DuckDuckGo Instant Answer
/// otherwise.
pub struct HttpSearchProvider {
    config: SearchConfig,
}

impl HttpSearchProvider {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl WebSearchProvider for HttpSearchProvider {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, EngineError> {
        let api_key = &self.config.google_api_key;
        let engine_id = &self.config.google_engine_id;

        if !api_key.is_empty() && !engine_id.is_empty() {
            if let Ok(results) = google_search(query, api_key, engine_id).await {
                if !results.is_empty() {
                    return Ok(truncated(results, max_results));
                }
            }
        }

        duckduckgo_search(query)
            .await
            .map(|results| truncated(results, max_results))
    }
}

fn truncated(mut results: Vec<SearchResult>, max_results: usize) -> Vec<SearchResult> {
    results.truncate(max_results.max(1));
    results
}

async fn google_search(
    query: &str,
    api_key: &str,
    engine_id: &str,
) -> Result<Vec<SearchResult>, EngineError> {
    let url = format!(
        "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}",
        api_key,
        engine_id,
        urlencoding::encode(query)
    );

    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .map_err(EngineError::internal)?;

    if !response.status().is_success() {
        return Err(EngineError::Internal(format!(
            "Google search failed: {}",
            response.status()
        )));
    }

    let payload: Value = response.json().await.map_err(EngineError::internal)?;
    let items = payload
        .get("items")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut results = Vec::new();
    for item in items {
        let title = item
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let url = item
            .get("link")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let snippet = item
            .get("snippet")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if !title.is_empty() && !url.is_empty() {
            results.push(SearchResult {
                title,
                url,
                snippet,
            });
        }
    }

    Ok(results)
}

async fn duckduckgo_search(query: &str) -> Result<Vec<SearchResult>, EngineError> {
    let url = format!(
        "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
        urlencoding::encode(query)
    );

    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .map_err(EngineError::internal)?;

    if !response.status().is_success() {
        return Err(EngineError::Internal(format!(
            "DuckDuckGo search failed: {}",
            response.status()
        )));
    }

    let payload: Value = response.json().await.map_err(EngineError::internal)?;
    let mut results = Vec::new();

    if let Some(abstract_text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
        if let Some(url) = payload.get("AbstractURL").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() && !url.is_empty() {
                results.push(SearchResult {
                    title: abstract_text
                        .split(" - ")
                        .next()
                        .unwrap_or(abstract_text)
                        .to_string(),
                    url: url.to_string(),
                    snippet: abstract_text.to_string(),
                });
            }
        }
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }

    Ok(results)
}

fn extract_ddg_topics(items: &[Value], results: &mut Vec<SearchResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_ddg_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(SearchResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}
