//! Error types for the assistant
//!
//! Two layers live here:
//! - [`RagError`] for crate-level failures (configuration, tokenizer,
//!   index, ingestion, I/O), propagated with `?`.
//! - [`AssistantError`] for the query path. Every failure a user can hit
//!   while asking a question is one of its variants; `Display` renders the
//!   user-facing text and [`AssistantError::kind`] lets callers branch
//!   without string matching.

use crate::context::SizingError;
use crate::providers::{Provider, ProviderError};
use thiserror::Error;

/// Crate-level result type
pub type Result<T> = std::result::Result<T, RagError>;

/// Crate-level errors
#[derive(Debug, Error)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Tokenizer initialization failed: {0}")]
    Tokenizer(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Document '{0}' already exists. Upload cancelled.")]
    DuplicateDocument(String),

    #[error("Document '{0}' contains no indexable text")]
    EmptyDocument(String),

    #[error("Document '{0}' is not valid UTF-8 text")]
    UnsupportedEncoding(String),

    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for RagError {
    fn from(err: config::ConfigError) -> Self {
        RagError::Configuration(err.to_string())
    }
}

/// Coarse classification of query-path failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing API key, unknown provider
    Configuration,
    /// Question or conversation over budget
    Sizing,
    /// Server-side failure that survived every retry
    Transient,
    /// Rate limit, connection failure, rejected request
    NonRetryable,
    /// Anything else
    Unexpected,
}

/// Query-path failure, rendered to user-facing text at the boundary
#[derive(Debug, Clone, Error)]
pub enum AssistantError {
    #[error("Error: {} API key not configured. Please provide your API key in the API Settings.", .0.as_str().to_uppercase())]
    MissingApiKey(Provider),

    #[error("Error: Unknown API provider '{0}'. Please select a valid provider.")]
    UnknownProvider(String),

    #[error("Your question is too long. Please reduce your input to continue the conversation.")]
    QuestionTooLong,

    #[error("The conversation has become too long. Please start a new conversation to continue.")]
    ConversationTooLong,

    #[error(
        "⚠️ The {0} API is currently experiencing issues (HTTP {1} server error). \
         This is a temporary server-side problem. Please try one of the following:\n\n\
         1. Wait a few moments and try again\n\
         2. Switch to another LLM provider ({alternatives}) in API Settings\n\
         3. Check {0}'s status page for updates",
        alternatives = .0.alternatives()
    )]
    ProviderUnavailable(Provider, u16),

    #[error("⚠️ Rate limit exceeded for {0} API. Please wait a moment before trying again, or switch to another LLM provider in API Settings.")]
    RateLimited(Provider),

    #[error("⚠️ Failed to connect to {0} API. Please check your internet connection and try again.")]
    ConnectionFailed(Provider),

    #[error("⚠️ {provider} API error: {message}. Please try again or switch to another provider in API Settings.")]
    Rejected { provider: Provider, message: String },

    #[error("⚠️ Unexpected error with {provider}: {message}")]
    Unexpected { provider: Provider, message: String },

    #[error("⚠️ Document search failed: {0}")]
    Retrieval(String),
}

impl AssistantError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssistantError::MissingApiKey(_) | AssistantError::UnknownProvider(_) => {
                ErrorKind::Configuration
            }
            AssistantError::QuestionTooLong | AssistantError::ConversationTooLong => {
                ErrorKind::Sizing
            }
            AssistantError::ProviderUnavailable(..) => ErrorKind::Transient,
            AssistantError::RateLimited(_)
            | AssistantError::ConnectionFailed(_)
            | AssistantError::Rejected { .. } => ErrorKind::NonRetryable,
            AssistantError::Unexpected { .. } | AssistantError::Retrieval(_) => {
                ErrorKind::Unexpected
            }
        }
    }

    /// Translate a backend failure that escaped the retry loop
    pub fn from_provider(provider: Provider, err: ProviderError) -> Self {
        match err {
            ProviderError::ServerError { status, .. } => {
                AssistantError::ProviderUnavailable(provider, status)
            }
            ProviderError::Unavailable(_) => AssistantError::ProviderUnavailable(provider, 503),
            ProviderError::RateLimited(_) => AssistantError::RateLimited(provider),
            ProviderError::Connection(_) => AssistantError::ConnectionFailed(provider),
            ProviderError::Api { message, .. } => AssistantError::Rejected { provider, message },
            ProviderError::InvalidResponse(message) | ProviderError::Other(message) => {
                AssistantError::Unexpected { provider, message }
            }
        }
    }
}

impl From<SizingError> for AssistantError {
    fn from(err: SizingError) -> Self {
        match err {
            SizingError::QuestionTooLong { .. } => AssistantError::QuestionTooLong,
            SizingError::ConversationTooLong { .. } => AssistantError::ConversationTooLong,
        }
    }
}
