//! Token budget with three bands
//!
//! - A single question may use at most `question_threshold` of the limit.
//! - Crossing `summarize_threshold` of the limit compresses older history.
//! - The assembled prompt may never exceed `token_limit`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token budget configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBudgetConfig {
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
    #[serde(default = "default_summarize_threshold")]
    pub summarize_threshold: f64,
    #[serde(default = "default_question_threshold")]
    pub question_threshold: f64,
}

fn default_token_limit() -> usize {
    8000
}

fn default_summarize_threshold() -> f64 {
    0.7
}

fn default_question_threshold() -> f64 {
    0.2
}

impl Default for TokenBudgetConfig {
    fn default() -> Self {
        Self {
            token_limit: default_token_limit(),
            summarize_threshold: default_summarize_threshold(),
            question_threshold: default_question_threshold(),
        }
    }
}

impl TokenBudgetConfig {
    /// Validate `0 < question < summarize < 1` and a non-zero limit
    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.token_limit == 0 {
            return Err(BudgetError::ConfigurationInvalid(
                "token_limit must be greater than zero".to_string(),
            ));
        }
        if !(self.question_threshold > 0.0
            && self.question_threshold < self.summarize_threshold
            && self.summarize_threshold < 1.0)
        {
            return Err(BudgetError::ConfigurationInvalid(format!(
                "thresholds must satisfy 0 < question ({}) < summarize ({}) < 1.0",
                self.question_threshold, self.summarize_threshold
            )));
        }
        Ok(())
    }
}

/// Token budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),
}

/// Fatal-to-the-turn sizing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizingError {
    #[error("Question uses {tokens} tokens, at most {max} allowed")]
    QuestionTooLong { tokens: usize, max: usize },

    #[error("Conversation uses {tokens} tokens, at most {max} allowed")]
    ConversationTooLong { tokens: usize, max: usize },
}

/// Validated token budget
#[derive(Debug, Clone)]
pub struct TokenBudget {
    config: TokenBudgetConfig,
}

impl TokenBudget {
    /// Create a new budget, rejecting inconsistent thresholds
    pub fn new(config: TokenBudgetConfig) -> Result<Self, BudgetError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Hard ceiling for the assembled prompt
    pub fn token_limit(&self) -> usize {
        self.config.token_limit
    }

    /// Largest question, in tokens, that passes the gate
    pub fn question_ceiling(&self) -> usize {
        (self.config.token_limit as f64 * self.config.question_threshold).floor() as usize
    }

    /// Projected usage above which older history is summarized
    pub fn summarize_ceiling(&self) -> usize {
        (self.config.token_limit as f64 * self.config.summarize_threshold) as usize
    }

    /// Reject a question that would eat too much of the budget
    pub fn check_question(&self, query_tokens: usize) -> Result<(), SizingError> {
        if query_tokens as f64 > self.config.token_limit as f64 * self.config.question_threshold {
            return Err(SizingError::QuestionTooLong {
                tokens: query_tokens,
                max: self.question_ceiling(),
            });
        }
        Ok(())
    }

    /// Whether the projected total crosses the summarization threshold
    pub fn exceeds_summarize_threshold(&self, projected_total: usize) -> bool {
        projected_total > self.summarize_ceiling()
    }

    /// Enforce the hard ceiling on the assembled prompt
    pub fn check_total(&self, total_tokens: usize) -> Result<(), SizingError> {
        if total_tokens > self.config.token_limit {
            return Err(SizingError::ConversationTooLong {
                tokens: total_tokens,
                max: self.config.token_limit,
            });
        }
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &TokenBudgetConfig {
        &self.config
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            config: TokenBudgetConfig::default(),
        }
    }
}
