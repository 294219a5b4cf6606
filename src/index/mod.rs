//! Per-user vector index.
//!
//! An append-only exact nearest-neighbor structure: an ordered list of
//! embedding vectors paired with chunk metadata, persisted as two artifacts
//! per user under the fixed index root. The flat structure supports no point
//! deletion, so document removal rebuilds the index from the surviving
//! chunks; that is the storage engine's policy, not an accident.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::AppPaths;
use crate::core::errors::EngineError;
use crate::llm::provider::LlmProvider;

/// One embedded unit of a document. Immutable once created; removed only by
/// a full rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub source_file_name: String,
    pub content: String,
}

/// Parallel vectors and chunk metadata. The i-th vector always corresponds
/// to the i-th chunk.
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn ntotal(&self) -> usize {
        self.vectors.len()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    pub fn append(
        &mut self,
        vectors: Vec<Vec<f32>>,
        chunks: Vec<IndexedChunk>,
    ) -> Result<(), EngineError> {
        if vectors.len() != chunks.len() {
            return Err(EngineError::Internal(format!(
                "vector/chunk count mismatch: {} != {}",
                vectors.len(),
                chunks.len()
            )));
        }
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(EngineError::Embedding(format!(
                    "expected dimension {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
        }

        self.vectors.extend(vectors);
        self.chunks.extend(chunks);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
        self.chunks.clear();
    }

    /// Exact k-NN under squared Euclidean distance, closest first. A
    /// candidate whose index falls outside the metadata (possible only under
    /// corruption) is skipped rather than failing the search.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<IndexedChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| (idx, squared_l2(query, vector)))
            .collect();

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .filter_map(|(idx, _)| self.chunks.get(idx).cloned())
            .collect()
    }

    /// Load a persisted index. `Ok(None)` when neither artifact exists;
    /// exactly one existing, or disagreeing lengths, is corruption and is
    /// refused loudly rather than truncated.
    pub fn load(
        dimension: usize,
        vector_path: &Path,
        metadata_path: &Path,
    ) -> Result<Option<Self>, EngineError> {
        match (vector_path.exists(), metadata_path.exists()) {
            (false, false) => return Ok(None),
            (true, true) => {}
            (true, false) => {
                return Err(EngineError::Corruption(format!(
                    "vector artifact {} has no metadata artifact",
                    vector_path.display()
                )))
            }
            (false, true) => {
                return Err(EngineError::Corruption(format!(
                    "metadata artifact {} has no vector artifact",
                    metadata_path.display()
                )))
            }
        }

        let bytes = std::fs::read(vector_path)?;
        let (stored_dimension, vectors) = decode_vectors(&bytes, vector_path)?;
        if stored_dimension != dimension {
            return Err(EngineError::Corruption(format!(
                "index dimension {stored_dimension} does not match configured {dimension}"
            )));
        }

        let raw = std::fs::read_to_string(metadata_path)?;
        let chunks: Vec<IndexedChunk> = serde_json::from_str(&raw).map_err(|e| {
            EngineError::Corruption(format!("metadata parse failed: {e}"))
        })?;

        if vectors.len() != chunks.len() {
            return Err(EngineError::Corruption(format!(
                "{} vectors but {} metadata entries",
                vectors.len(),
                chunks.len()
            )));
        }

        debug!("Loaded index: {} vectors", vectors.len());
        Ok(Some(Self {
            dimension,
            vectors,
            chunks,
        }))
    }

    /// Persist both artifacts. Each is written to a temp file and renamed
    /// into place so a crash can never leave a half-written artifact behind.
    pub fn save(&self, vector_path: &Path, metadata_path: &Path) -> Result<(), EngineError> {
        let bytes = encode_vectors(self.dimension, &self.vectors);
        write_atomic(vector_path, &bytes)?;

        let raw = serde_json::to_vec(&self.chunks).map_err(EngineError::internal)?;
        write_atomic(metadata_path, &raw)?;

        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// `[dimension: u32 LE][count: u32 LE][count * dimension * f32 LE]`
fn encode_vectors(dimension: usize, vectors: &[Vec<f32>]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + vectors.len() * dimension * 4);
    bytes.extend_from_slice(&(dimension as u32).to_le_bytes());
    bytes.extend_from_slice(&(vectors.len() as u32).to_le_bytes());
    for vector in vectors {
        for value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    bytes
}

fn decode_vectors(bytes: &[u8], path: &Path) -> Result<(usize, Vec<Vec<f32>>), EngineError> {
    if bytes.len() < 8 {
        return Err(EngineError::Corruption(format!(
            "vector artifact {} is truncated",
            path.display()
        )));
    }

    let dimension = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let count = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let payload = &bytes[8..];

    if dimension == 0 || payload.len() != count * dimension * 4 {
        return Err(EngineError::Corruption(format!(
            "vector artifact {} payload does not match header",
            path.display()
        )));
    }

    let mut values = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));

    let mut vectors = Vec::with_capacity(count);
    for _ in 0..count {
        vectors.push(values.by_ref().take(dimension).collect());
    }

    Ok((dimension, vectors))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// One user's index plus the embedding handle: the scope `U` of every
/// retrieval. Distinct users never share an instance or an artifact pair.
pub struct UserIndex {
    user_id: u64,
    vector_path: PathBuf,
    metadata_path: PathBuf,
    index: VectorIndex,
    embedder: Arc<dyn LlmProvider>,
    embedding_model: String,
}

impl UserIndex {
    /// Load the persisted index for `user_id`, or lazily start an empty one
    /// when nothing has been persisted yet.
    pub fn open(
        user_id: u64,
        paths: &AppPaths,
        dimension: usize,
        embedder: Arc<dyn LlmProvider>,
        embedding_model: String,
    ) -> Result<Self, EngineError> {
        let vector_path = paths.vector_path(user_id);
        let metadata_path = paths.metadata_path(user_id);

        let index = match VectorIndex::load(dimension, &vector_path, &metadata_path)? {
            Some(index) => index,
            None => VectorIndex::new(dimension),
        };

        Ok(Self {
            user_id,
            vector_path,
            metadata_path,
            index,
            embedder,
            embedding_model,
        })
    }

    pub fn ntotal(&self) -> usize {
        self.index.ntotal()
    }

    /// Embed and append `chunks`, then persist both artifacts. Empty input
    /// is a no-op and does not touch disk. An embedding failure aborts
    /// before any mutation, so the persist step never runs on bad data.
    pub async fn add(&mut self, chunks: Vec<IndexedChunk>) -> Result<(), EngineError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let vectors = self.embed_contents(&chunks).await?;
        self.index.append(vectors, chunks)?;
        self.persist()?;

        info!(
            "Indexed chunks for user {}: ntotal now {}",
            self.user_id,
            self.index.ntotal()
        );
        Ok(())
    }

    /// Nearest chunks for `query`, closest first. An empty index returns an
    /// empty result without calling the embedding provider.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<IndexedChunk>, EngineError> {
        if self.index.ntotal() == 0 {
            return Ok(Vec::new());
        }

        let embeddings = self
            .embedder
            .embed(&[query.to_string()], &self.embedding_model)
            .await?;
        let query_vector = embeddings
            .first()
            .ok_or_else(|| EngineError::Embedding("provider returned no query vector".to_string()))?;

        Ok(self.index.search(query_vector, top_k))
    }

    /// Discard every vector and re-embed `chunks` from scratch. An empty
    /// input persists a valid empty index, which short-circuits future
    /// searches.
    pub async fn rebuild(&mut self, chunks: Vec<IndexedChunk>) -> Result<(), EngineError> {
        let vectors = if chunks.is_empty() {
            Vec::new()
        } else {
            self.embed_contents(&chunks).await?
        };

        self.index.clear();
        self.index.append(vectors, chunks)?;
        self.persist()?;
        Ok(())
    }

    /// Drop all chunks of `file_name` and rebuild with the remainder. When
    /// no chunk matched this is a no-op and nothing is persisted.
    pub async fn remove_document(&mut self, file_name: &str) -> Result<(), EngineError> {
        let remaining: Vec<IndexedChunk> = self
            .index
            .chunks()
            .iter()
            .filter(|chunk| chunk.source_file_name != file_name)
            .cloned()
            .collect();

        if remaining.len() == self.index.ntotal() {
            debug!("No chunks matched {file_name} for user {}", self.user_id);
            return Ok(());
        }

        info!(
            "Removing {} for user {}: rebuilding {} chunks",
            file_name,
            self.user_id,
            remaining.len()
        );
        self.rebuild(remaining).await
    }

    async fn embed_contents(
        &self,
        chunks: &[IndexedChunk],
    ) -> Result<Vec<Vec<f32>>, EngineError> {
        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        self.embedder
            .embed(&contents, &self.embedding_model)
            .await
    }

    fn persist(&self) -> Result<(), EngineError> {
        self.index.save(&self.vector_path, &self.metadata_path)
    }
}
