//! Query orchestration
//!
//! One question flows through: index search, relevance gate, context
//! formatting, provider dispatch. Document management operations are exposed
//! here too so front ends only need one handle.

use crate::context::{ConversationSession, FALLBACK_ANSWER};
use crate::error::{AssistantError, Result};
use crate::index::{DocumentIndex, SearchResults};
use crate::ingest::{ClearReport, DocumentLibrary, DocumentSummary, UploadReceipt, UploadedFile};
use crate::metrics::METRICS;
use crate::providers::{Credentials, Provider, ProviderClient};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Best-match distance above which retrieved context is considered irrelevant
pub const DEFAULT_RELEVANCE_CEILING: f32 = 0.7;

/// Where an answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Model,
    /// The relevance gate answered without calling a provider
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

impl Answer {
    pub fn fallback() -> Self {
        Self {
            text: FALLBACK_ANSWER.to_string(),
            source: AnswerSource::Fallback,
        }
    }
}

pub type Reply = std::result::Result<Answer, AssistantError>;

/// Display text for any reply
pub fn render(reply: &Reply) -> String {
    match reply {
        Ok(answer) => answer.text.clone(),
        Err(e) => e.to_string(),
    }
}

/// Numbered sources block sent to the model
pub fn format_context(results: &SearchResults) -> String {
    let mut context = String::from("Relevant findings:\n\n");
    for (i, hit) in results.hits().enumerate() {
        let source = hit.metadata.map(|m| m.source.as_str()).unwrap_or("Unknown");
        context.push_str(&format!(
            "Source {}: {}\nContent:\n{}\n\n",
            i + 1,
            source,
            hit.document
        ));
    }
    context
}

pub struct QueryOrchestrator {
    index: Arc<dyn DocumentIndex>,
    library: DocumentLibrary,
    client: ProviderClient,
    relevance_ceiling: f32,
}

impl QueryOrchestrator {
    pub fn new(library: DocumentLibrary, client: ProviderClient) -> Self {
        Self {
            index: Arc::clone(library.index()),
            library,
            client,
            relevance_ceiling: DEFAULT_RELEVANCE_CEILING,
        }
    }

    pub fn with_relevance_ceiling(mut self, ceiling: f32) -> Self {
        self.relevance_ceiling = ceiling;
        self
    }

    /// Answer `query` from the indexed documents using `provider_name`
    pub async fn answer(
        &self,
        session: &mut ConversationSession,
        query: &str,
        n_results: usize,
        provider_name: &str,
        credentials: &Credentials,
    ) -> Reply {
        let results = self
            .index
            .search(query, n_results)
            .await
            .map_err(|e| AssistantError::Retrieval(e.to_string()))?;

        match results.best_distance() {
            Some(best) if best <= self.relevance_ceiling => {
                debug!(session = %session.id(), "Best distance {:.4} passes the relevance gate", best);
            }
            best => {
                info!(
                    session = %session.id(),
                    "No relevant context (best distance {:?}), answering with fallback",
                    best
                );
                METRICS.record_gate_rejection();
                return Ok(Answer::fallback());
            }
        }

        let context = format_context(&results);
        let provider: Provider = provider_name.parse()?;

        let text = self
            .client
            .chat(session, provider, query, &context, credentials)
            .await?;
        Ok(Answer {
            text,
            source: AnswerSource::Model,
        })
    }

    pub async fn upload(&self, file: UploadedFile) -> Result<UploadReceipt> {
        self.library.upload(file).await
    }

    pub async fn delete(&self, doc_id: &str) -> Result<usize> {
        self.library.delete(doc_id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        self.library.list_documents().await
    }

    pub async fn clear_all(&self) -> Result<ClearReport> {
        self.library.clear_all().await
    }

    pub async fn load_directory(&self, dir: impl AsRef<Path>) -> Result<usize> {
        self.library.load_directory(dir).await
    }

    pub fn clear_history(&self, session: &mut ConversationSession) {
        session.clear_history();
    }
}
