//! Engine facade.
//!
//! The surrounding application holds one [`RagEngine`] and calls it with a
//! user identifier plus a file or a query. Ingestion and deletion mutate the
//! per-user index under a per-user lock; queries are read-only and run
//! unserialized.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::chunker;
use crate::core::config::{AppPaths, EngineConfig};
use crate::core::errors::EngineError;
use crate::extract::extract_text;
use crate::generator::{AnswerGenerator, AnswerStream, GENERATION_ERROR_PREFIX};
use crate::index::{IndexedChunk, UserIndex};
use crate::llm::provider::LlmProvider;
use crate::llm::types::ChatMessage;
use crate::search::WebSearchProvider;

pub struct RagEngine {
    config: EngineConfig,
    paths: AppPaths,
    llm: Arc<dyn LlmProvider>,
    generator: AnswerGenerator,
    /// One lock handle per user; two concurrent mutations for the same user
    /// must not interleave their read-modify-persist cycle.
    user_locks: Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>,
}

impl RagEngine {
    pub fn new(
        config: EngineConfig,
        paths: AppPaths,
        llm: Arc<dyn LlmProvider>,
        web: Arc<dyn WebSearchProvider>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let generator = AnswerGenerator::new(
            llm.clone(),
            web,
            config.llm.clone(),
            config.retrieval.top_k,
            config.search.max_results,
        );

        Ok(Self {
            config,
            paths,
            llm,
            generator,
            user_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Extract, chunk, embed, and index an uploaded file that the caller
    /// has already stored durably at `file_path`. Unsupported formats yield
    /// no chunks and leave the index untouched; extraction and embedding
    /// failures propagate so the upload is not finalized as indexed.
    pub async fn add_document(
        &self,
        user_id: u64,
        file_path: &Path,
        file_name: &str,
    ) -> Result<(), EngineError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let text = extract_text(file_path).await?;
        let chunks = chunker::chunk(&text, &self.config.chunking)?;
        if chunks.is_empty() {
            info!("No indexable text in {file_name}; skipping");
            return Ok(());
        }

        let chunks: Vec<IndexedChunk> = chunks
            .into_iter()
            .map(|content| IndexedChunk {
                source_file_name: file_name.to_string(),
                content,
            })
            .collect();

        let mut index = self.open_index(user_id)?;
        index.add(chunks).await
    }

    /// Drop every chunk of `file_name` from the user's index, rebuilding
    /// from the remainder. Called after the backing file and its record are
    /// already gone.
    pub async fn remove_document(&self, user_id: u64, file_name: &str) -> Result<(), EngineError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut index = self.open_index(user_id)?;
        index.remove_document(file_name).await
    }

    /// Answer `query` against the user's documents, streaming fragments.
    /// `history` is the prior conversation, oldest first, excluding the
    /// current query. The conversation always terminates in visible text:
    /// even a corrupt index surfaces as a readable error fragment rather
    /// than a broken connection.
    pub async fn generate_response(
        &self,
        user_id: u64,
        query: &str,
        history: &[ChatMessage],
    ) -> AnswerStream {
        match self.open_index(user_id) {
            Ok(index) => self.generator.generate(user_id, &index, query, history).await,
            Err(err) => {
                warn!("Refusing to serve index for user {user_id}: {err}");
                let (tx, rx) = tokio::sync::mpsc::channel(1);
                tokio::spawn(async move {
                    let _ = tx.send(format!("{GENERATION_ERROR_PREFIX}{err}")).await;
                });
                rx
            }
        }
    }

    fn open_index(&self, user_id: u64) -> Result<UserIndex, EngineError> {
        UserIndex::open(
            user_id,
            &self.paths,
            self.config.retrieval.dimension,
            self.llm.clone(),
            self.config.llm.embedding_model.clone(),
        )
    }

    fn user_lock(&self, user_id: u64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.user_locks.lock().expect("user lock map poisoned");
        locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
