//! Answer generator port and prompt construction.
//!
//! An [`AnswerGenerator`] turns a question plus already-ranked context
//! chunks into answer text. It never re-ranks and never persists.
//! [`ExtractiveGenerator`] is the deterministic, model-free implementation;
//! LLM-backed generators live in the `lexrag` app crate and share
//! [`SYSTEM_PROMPT`] and [`build_prompt`].

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Chunk;

/// Answer returned when retrieval produced no context.
pub const NO_CONTEXT_ANSWER: &str =
    "I could not find any relevant passages in the uploaded documents to answer this question.";

/// System prompt for LLM-backed generators.
pub const SYSTEM_PROMPT: &str = "You are a legal document assistant. Answer the user's question \
using only the numbered excerpts provided as context. Cite excerpts by their number, for example [1]. \
If the excerpts do not contain the answer, say that the documents do not address the question. \
Never invent facts, parties, dates, or citations.";

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Produce non-empty answer text. An empty `context` must yield a
    /// graceful "insufficient context" answer, not an error.
    async fn generate_answer(&self, question: &str, context: &[Chunk]) -> Result<String>;
}

/// Render the user message sent to an LLM: numbered excerpts, then the question.
pub fn build_prompt(question: &str, context: &[Chunk]) -> String {
    let mut excerpts = String::new();
    for (i, chunk) in context.iter().enumerate() {
        excerpts.push_str(&format!("[{}] {}\n\n", i + 1, chunk.text.trim()));
    }
    format!(
        "Context Information:\n==================\n{}User Question:\n==================\n{}\n",
        excerpts,
        question.trim()
    )
}

/// Quotes the supplied excerpts in rank order.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    max_excerpt_chars: usize,
}

impl ExtractiveGenerator {
    pub fn new() -> Self {
        Self {
            max_excerpt_chars: 400,
        }
    }

    /// Excerpts longer than `max_chars` are cut at a char boundary and end with `…`.
    pub fn with_max_excerpt_chars(mut self, max_chars: usize) -> Self {
        self.max_excerpt_chars = max_chars.max(1);
        self
    }

    fn excerpt<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        let text = text.trim();
        match text.char_indices().nth(self.max_excerpt_chars) {
            Some((cut, _)) => format!("{}…", text[..cut].trim_end()).into(),
            None => text.into(),
        }
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    async fn generate_answer(&self, question: &str, context: &[Chunk]) -> Result<String> {
        if context.is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }
        let mut answer = format!(
            "The documents contain the following passages relevant to \"{}\":\n",
            question.trim()
        );
        for (i, chunk) in context.iter().enumerate() {
            answer.push_str(&format!("\n[{}] {}", i + 1, self.excerpt(&chunk.text)));
        }
        Ok(answer)
    }
}
