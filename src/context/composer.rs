//! Conversation session with token budget enforcement
//!
//! [`ConversationSession::prepare`] turns the stored history plus the current
//! question into the message sequence sent to a provider:
//! - questions over `question_threshold` of the limit are refused untouched
//! - once the projected prompt crosses `summarize_threshold`, everything but
//!   the last [`RECENT_MESSAGES`] is summarized and dropped from history
//! - the assembled prompt must fit `token_limit`

use super::models::{ChatHistory, ChatMessage};
use super::summarizer::{ConcatenationSummarizer, Summarizer};
use super::token_budget::{SizingError, TokenBudget};
use super::token_estimator::TokenEstimator;
use crate::metrics::METRICS;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Messages kept verbatim when older history is summarized (three exchanges)
pub const RECENT_MESSAGES: usize = 6;

/// Header of the system message carrying a summary
pub const SUMMARY_HEADER: &str = "Previous conversation summary:\n";

/// Sentence the model must use when the context does not contain the answer
pub const FALLBACK_ANSWER: &str = "I don't have enough information to answer this question.";

/// Messages ready to send, plus whether history was compressed to get there
#[derive(Debug, Clone)]
pub struct PreparedContext {
    pub messages: Vec<ChatMessage>,
    pub summarized: bool,
    pub total_tokens: usize,
}

/// One user's conversation and its token budget
pub struct ConversationSession {
    id: Uuid,
    budget: TokenBudget,
    estimator: Arc<dyn TokenEstimator>,
    history: ChatHistory,
}

impl ConversationSession {
    pub fn new(budget: TokenBudget, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            id: Uuid::new_v4(),
            budget,
            estimator,
            history: ChatHistory::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Read-only view of the stored conversation
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Sum of per-message token counts over the stored history
    pub fn history_tokens(&self) -> usize {
        self.count_messages(self.history.messages())
    }

    pub fn clear_history(&mut self) {
        info!(session = %self.id, "Clearing {} history messages", self.history.len());
        self.history.clear();
    }

    /// Store a completed exchange
    pub fn record_exchange(&mut self, query: &str, answer: &str) {
        self.history.add_exchange(query, answer);
        debug!(
            session = %self.id,
            messages = self.history.len(),
            "Recorded exchange"
        );
    }

    /// Assemble the prompt for `query`, summarizing older history if needed
    pub async fn prepare(
        &mut self,
        query: &str,
        system_prompt: &str,
        context: &str,
        summarizer: &dyn Summarizer,
    ) -> Result<PreparedContext, SizingError> {
        let query_tokens = self.estimator.estimate(query);
        let system_tokens = self.estimator.estimate(system_prompt);
        let context_tokens = self.estimator.estimate(context);
        let history_tokens = self.history_tokens();

        if let Err(e) = self.budget.check_question(query_tokens) {
            warn!(session = %self.id, "Question rejected: {}", e);
            METRICS.record_sizing_rejection("question");
            return Err(e);
        }

        let projected = system_tokens + context_tokens + query_tokens + history_tokens;
        debug!(
            session = %self.id,
            "Token usage: system={}, context={}, query={}, history={}, total={}",
            system_tokens, context_tokens, query_tokens, history_tokens, projected
        );

        let summary = if self.budget.exceeds_summarize_threshold(projected)
            && self.history.len() > RECENT_MESSAGES
        {
            info!(
                session = %self.id,
                "Token limit reached ({} > {}), summarizing older history",
                projected,
                self.budget.summarize_ceiling()
            );
            Some(self.summarize_older(summarizer).await)
        } else {
            None
        };

        let mut messages = Vec::with_capacity(self.history.len() + 3);
        messages.push(ChatMessage::system(system_prompt));
        if let Some(summary) = &summary {
            messages.push(ChatMessage::system(format!("{}{}", SUMMARY_HEADER, summary)));
        }
        messages.extend(self.history.messages().iter().cloned());
        messages.push(ChatMessage::user(format_question(context, query)));

        let total_tokens = self.count_messages(&messages);
        if let Err(e) = self.budget.check_total(total_tokens) {
            warn!(session = %self.id, "Conversation rejected: {}", e);
            METRICS.record_sizing_rejection("conversation");
            return Err(e);
        }

        METRICS.record_prompt_tokens(total_tokens);
        Ok(PreparedContext {
            messages,
            summarized: summary.is_some(),
            total_tokens,
        })
    }

    /// Drop all but the recent messages and return a summary of what was dropped
    async fn summarize_older(&mut self, summarizer: &dyn Summarizer) -> String {
        let older = self.history.split_off_older(RECENT_MESSAGES);

        match summarizer.summarize(&older).await {
            Ok(summary) if !summary.trim().is_empty() => {
                METRICS.record_summarization("model");
                info!(
                    session = %self.id,
                    "Summarized {} messages into {} tokens",
                    older.len(),
                    self.estimator.estimate(&summary)
                );
                summary
            }
            Ok(_) => {
                warn!(session = %self.id, "Summarizer returned nothing, using fallback summary");
                METRICS.record_summarization("fallback");
                ConcatenationSummarizer::fallback_summary(&older)
            }
            Err(e) => {
                warn!(session = %self.id, "Model summarization failed: {}, using fallback summary", e);
                METRICS.record_summarization("fallback");
                ConcatenationSummarizer::fallback_summary(&older)
            }
        }
    }

    fn count_messages(&self, messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .map(|m| self.estimator.estimate(m.content()))
            .sum()
    }
}

/// The final user message wrapping retrieved context and the question
pub fn format_question(context: &str, query: &str) -> String {
    format!(
        "Context:\n{}\n\nQuestion: {}\n\nRemember: If the answer is not fully contained in the context, reply ONLY with '{}'",
        context, query, FALLBACK_ANSWER
    )
}
