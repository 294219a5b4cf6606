//! Answer generation.
//!
//! One decision procedure per query: answer from retrieved document context,
//! run a user-confirmed web search, ask for permission to search, or respond
//! conversationally — then stream the model's output. The stream is lazy and
//! single-pass; the caller drains it in order and persists the concatenated
//! reply only after exhaustion. A dropped receiver aborts the producer and
//! nothing is treated as a finished answer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::config::LlmConfig;
use crate::core::errors::EngineError;
use crate::index::UserIndex;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatMessage, ChatRequest};
use crate::search::WebSearchProvider;

/// Lazy, single-pass sequence of answer fragments. Errors never surface
/// here; they arrive as a terminal human-readable fragment.
pub type AnswerStream = mpsc::Receiver<String>;

/// The fixed permission request. Detected by substring match against the
/// most recent assistant turn, so it must never be reworded casually.
pub const WEB_PERMISSION_PROMPT: &str = "Should I search the web for you? (Yes/No)";

/// Entire reply emitted when retrieval finds nothing for a substantive
/// query. Contains [`WEB_PERMISSION_PROMPT`] so the next turn can detect
/// the pending confirmation.
pub const NO_CONTEXT_REPLY: &str =
    "This information is not mentioned in your documents. Should I search the web for you? (Yes/No)";

pub(crate) const GENERATION_ERROR_PREFIX: &str =
    "I'm sorry, I encountered an error while processing your request: ";

const NO_CONTEXT_PLACEHOLDER: &str = "No research context available.";

const AFFIRMATIVE_WORDS: &[&str] = &["yes", "yup", "yeah", "ok", "sure"];

const SMALL_TALK_MARKERS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "who are you",
    "what can you do",
    "thanks",
    "thank you",
    "how are you",
];

const SMALL_TALK_MAX_WORDS: usize = 6;

/// True when the previous assistant turn asked for web-search permission.
/// Pure over `history` so the confirmation logic is testable without the
/// model path.
pub fn awaiting_web_confirmation(history: &[ChatMessage]) -> bool {
    history
        .iter()
        .rev()
        .find(|msg| msg.role == "assistant")
        .map(|msg| msg.content.contains(WEB_PERMISSION_PROMPT))
        .unwrap_or(false)
}

pub fn is_affirmative(query: &str) -> bool {
    let lowered = query.to_lowercase();
    AFFIRMATIVE_WORDS.iter().any(|word| lowered.contains(word))
}

pub fn is_small_talk(query: &str) -> bool {
    let lowered = query.to_lowercase();
    SMALL_TALK_MARKERS.iter().any(|marker| lowered.contains(marker))
        && query.split_whitespace().count() < SMALL_TALK_MAX_WORDS
}

/// The question the user originally asked before confirming: the most
/// recent user turn that is not itself an affirmation. Falls back to the
/// current query when history holds nothing better.
pub fn recover_pending_question(history: &[ChatMessage], query: &str) -> String {
    history
        .iter()
        .rev()
        .find(|msg| msg.role == "user" && !msg.content.to_lowercase().contains("yes"))
        .map(|msg| msg.content.clone())
        .unwrap_or_else(|| query.to_string())
}

enum AnswerContext {
    Documents { text: String, files: Vec<String> },
    WebSearch { text: String },
    GeneralConversation,
}

enum Plan {
    /// Emit this text as the entire stream without invoking the model.
    ShortCircuit(String),
    Generate(AnswerContext),
}

pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    web: Arc<dyn WebSearchProvider>,
    llm_config: LlmConfig,
    top_k: usize,
    web_max_results: usize,
}

impl AnswerGenerator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        web: Arc<dyn WebSearchProvider>,
        llm_config: LlmConfig,
        top_k: usize,
        web_max_results: usize,
    ) -> Self {
        Self {
            llm,
            web,
            llm_config,
            top_k,
            web_max_results,
        }
    }

    /// Run the decision procedure for one query and stream the answer.
    /// Failures anywhere on this path become a terminal descriptive
    /// fragment; the caller never sees an `Err`.
    pub async fn generate(
        &self,
        user_id: u64,
        index: &UserIndex,
        query: &str,
        history: &[ChatMessage],
    ) -> AnswerStream {
        let (tx, rx) = mpsc::channel(32);

        match self.run(user_id, index, query, history).await {
            Ok(Plan::ShortCircuit(text)) => {
                tokio::spawn(async move {
                    let _ = tx.send(text).await;
                });
            }
            Ok(Plan::Generate(context)) => {
                match self.invoke_model(user_id, query, history, &context).await {
                    Ok(mut stream) => {
                        tokio::spawn(async move {
                            while let Some(item) = stream.recv().await {
                                match item {
                                    Ok(fragment) => {
                                        if tx.send(fragment).await.is_err() {
                                            // Receiver dropped: discard-on-cancel.
                                            return;
                                        }
                                    }
                                    Err(err) => {
                                        let _ = tx
                                            .send(format!("{GENERATION_ERROR_PREFIX}{err}"))
                                            .await;
                                        return;
                                    }
                                }
                            }
                        });
                    }
                    Err(err) => {
                        warn!("Generation failed for user {user_id}: {err}");
                        tokio::spawn(async move {
                            let _ = tx.send(format!("{GENERATION_ERROR_PREFIX}{err}")).await;
                        });
                    }
                }
            }
            Err(err) => {
                warn!("Failed to prepare answer for user {user_id}: {err}");
                tokio::spawn(async move {
                    let _ = tx.send(format!("{GENERATION_ERROR_PREFIX}{err}")).await;
                });
            }
        }

        rx
    }

    async fn run(
        &self,
        user_id: u64,
        index: &UserIndex,
        query: &str,
        history: &[ChatMessage],
    ) -> Result<Plan, EngineError> {
        let context_docs = if index.ntotal() == 0 {
            Vec::new()
        } else {
            index.search(query, self.top_k).await?
        };

        if awaiting_web_confirmation(history) && is_affirmative(query) {
            let subject = recover_pending_question(history, query);
            info!("User {user_id} confirmed web search for: {subject}");
            let text = self.run_web_search(&subject).await;
            return Ok(Plan::Generate(AnswerContext::WebSearch { text }));
        }

        if context_docs.is_empty() {
            if is_small_talk(query) {
                return Ok(Plan::Generate(AnswerContext::GeneralConversation));
            }
            // Substantive query with nothing relevant indexed: ask before
            // going to the web, and skip the model entirely this turn.
            return Ok(Plan::ShortCircuit(NO_CONTEXT_REPLY.to_string()));
        }

        let text = context_docs
            .iter()
            .map(|doc| doc.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut files: Vec<String> = Vec::new();
        for doc in &context_docs {
            if !files.contains(&doc.source_file_name) {
                files.push(doc.source_file_name.clone());
            }
        }

        Ok(Plan::Generate(AnswerContext::Documents { text, files }))
    }

    /// Best-effort: a search failure yields an empty context, never an
    /// error in the conversation.
    async fn run_web_search(&self, subject: &str) -> String {
        match self.web.search(subject, self.web_max_results).await {
            Ok(results) => results
                .iter()
                .map(|r| format!("Source: {}\nContent: {}", r.url, r.snippet))
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(err) => {
                warn!("Web search failed: {err}");
                String::new()
            }
        }
    }

    async fn invoke_model(
        &self,
        user_id: u64,
        query: &str,
        history: &[ChatMessage],
        context: &AnswerContext,
    ) -> Result<mpsc::Receiver<Result<String, EngineError>>, EngineError> {
        let system_prompt = build_system_prompt(user_id, context);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(query));

        let mut request = ChatRequest::new(messages);
        request.temperature = Some(self.llm_config.temperature);
        request.max_tokens = Some(self.llm_config.max_tokens);

        self.llm
            .stream_chat(request, &self.llm_config.chat_model)
            .await
    }
}

fn build_system_prompt(user_id: u64, context: &AnswerContext) -> String {
    let context_text = match context {
        AnswerContext::Documents { text, .. } => text.as_str(),
        AnswerContext::WebSearch { text } => text.as_str(),
        AnswerContext::GeneralConversation => "",
    };

    let availability = if context_text.is_empty() {
        "None (General Conversation)"
    } else {
        "Available"
    };

    let files_list = match context {
        AnswerContext::Documents { files, .. } if !files.is_empty() => files.join(", "),
        _ => "N/A".to_string(),
    };

    format!(
        "You are ResearchHUB AI, an expert research assistant.\n\
         \n\
         Strict Guidelines:\n\
         1. Response Style: Professional, concise, and synthesized.\n\
         2. SYNTHESIZE: When using web results, read all the information and provide a single, well-structured answer in your own words.\n\
         3. Formatting: Use Markdown for readability.\n\
         4. Source Transparency & Privacy:\n\
            - You ONLY have access to documents uploaded by User ID {user_id}.\n\
         \n\
         Context Availability: {availability}\n\
         \n\
         Instructions:\n\
         - If using documents, start with: \"Based on the documents you uploaded ({files_list}), I found this:\" and then provide the answer. Do NOT include any URLs or links.\n\
         - If using web search, start with: \"[Source: Web Search]\" and provide a synthesized answer. Only include reference links at the very bottom if absolutely necessary.\n\
         - If it's a general greeting or casual question, just be friendly and helpful. Do NOT include any URLs or links.\n\
         - IMPORTANT: Do NOT add random links or URLs unless the information actually came from the web search. Never fabricate or guess URLs.\n\
         \n\
         Current Context:\n\
         {context}",
        user_id = user_id,
        availability = availability,
        files_list = files_list,
        context = if context_text.is_empty() {
            NO_CONTEXT_PLACEHOLDER
        } else {
            context_text
        },
    )
}
