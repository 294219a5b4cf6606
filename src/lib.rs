//! ResearchHUB core — per-user document retrieval and conversational
//! answering.
//!
//! The crate ingests uploaded files into per-user vector indices, retrieves
//! relevant passages by nearest-neighbor search, and streams synthesized
//! answers that combine retrieved context, conversation history, and an
//! optional web search. The surrounding web application (routing, auth,
//! chat persistence) calls into [`engine::RagEngine`] and drains the
//! returned fragment stream.

pub mod chunker;
pub mod core;
pub mod engine;
pub mod extract;
pub mod generator;
pub mod index;
pub mod llm;
pub mod logging;
pub mod search;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::core::config::{AppPaths, EngineConfig};
pub use crate::core::errors::EngineError;
pub use crate::engine::RagEngine;
pub use crate::generator::AnswerStream;
pub use crate::index::IndexedChunk;
pub use crate::llm::types::ChatMessage;
pub use crate::llm::OpenAiCompatProvider;
pub use crate::search::HttpSearchProvider;
