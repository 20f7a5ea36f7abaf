//! Retrieval-augmented query assistant with token-bounded conversation memory
//!
//! Documents are chunked into an index; each question retrieves the closest
//! chunks, passes a relevance gate and is answered by one of four LLM
//! providers (Groq, OpenAI, Gemini, Deepseek). Conversation history is kept
//! within a fixed token budget by summarizing older turns.

pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod ingest;
pub mod metrics;
pub mod orchestrator;
pub mod providers;

pub mod prelude {
    pub use crate::config::{Config, ProviderEndpoint, ProvidersConfig};
    pub use crate::context::{
        ChatMessage, ConversationSession, Role, TiktokenEstimator, TokenBudget,
        TokenBudgetConfig, TokenEstimator, WordBasedEstimator, FALLBACK_ANSWER,
    };
    pub use crate::error::{AssistantError, ErrorKind, RagError, Result};
    pub use crate::index::{DocumentIndex, InMemoryIndex, SearchResults};
    pub use crate::ingest::{create_chunker, ChunkingConfig, DocumentLibrary, UploadedFile};
    pub use crate::orchestrator::{render, Answer, AnswerSource, QueryOrchestrator, Reply};
    pub use crate::providers::{
        BackendFactory, Credentials, HttpBackendFactory, InMemoryKeyStore, KeyStore, Provider,
        ProviderClient, ProviderError, RetryPolicy, Sleeper, TextGenerationBackend,
    };
}
