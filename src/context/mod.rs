//! Conversation memory with token budget enforcement
//!
//! Chat history is bounded by a [`TokenBudget`]: over-long questions are
//! refused, older turns are summarized once the prompt grows past the
//! summarization threshold, and the assembled prompt never exceeds the limit.

pub mod composer;
pub mod models;
pub mod summarizer;
pub mod token_budget;
pub mod token_estimator;

pub use composer::{
    format_question, ConversationSession, PreparedContext, FALLBACK_ANSWER, RECENT_MESSAGES,
    SUMMARY_HEADER,
};
pub use models::{format_transcript, ChatHistory, ChatMessage, Role};
pub use summarizer::{ConcatenationSummarizer, LlmSummarizer, Summarizer, SummarizerError};
pub use token_budget::{BudgetError, SizingError, TokenBudget, TokenBudgetConfig};
pub use token_estimator::{TiktokenEstimator, TokenEstimator, WordBasedEstimator};
