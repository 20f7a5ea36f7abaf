//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rag_assistant::context::ChatMessage;
use rag_assistant::index::{ChunkMetadata, DocumentIndex, IndexedChunk, SearchResults, UploadType};
use rag_assistant::prelude::*;
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies handed out in order; "scripted answer" once exhausted
#[derive(Default)]
pub struct Script {
    replies: Mutex<VecDeque<std::result::Result<String, ProviderError>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
    builds: Mutex<Vec<Provider>>,
}

impl Script {
    pub fn new(replies: Vec<std::result::Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Vec<ChatMessage>, f32)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn builds(&self) -> Vec<Provider> {
        self.builds.lock().unwrap().clone()
    }
}

pub struct ScriptedBackend {
    provider: Provider,
    script: Arc<Script>,
}

#[async_trait]
impl TextGenerationBackend for ScriptedBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> std::result::Result<String, ProviderError> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), temperature));
        self.script
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("scripted answer".to_string()))
    }
}

pub struct ScriptedFactory {
    pub script: Arc<Script>,
}

impl BackendFactory for ScriptedFactory {
    fn build(
        &self,
        provider: Provider,
        _api_key: &SecretString,
    ) -> std::result::Result<Box<dyn TextGenerationBackend>, ProviderError> {
        self.script.builds.lock().unwrap().push(provider);
        Ok(Box::new(ScriptedBackend {
            provider,
            script: Arc::clone(&self.script),
        }))
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Index returning fixed search results regardless of the query
pub struct FixedIndex {
    hits: Vec<(IndexedChunk, f32)>,
}

impl FixedIndex {
    pub fn new(distances: &[f32]) -> Self {
        let hits = distances
            .iter()
            .enumerate()
            .map(|(i, d)| (chunk(&format!("doc{}.txt", i + 1), &format!("content {}", i + 1)), *d))
            .collect();
        Self { hits }
    }
}

#[async_trait]
impl DocumentIndex for FixedIndex {
    async fn search(&self, _query: &str, k: usize) -> Result<SearchResults> {
        Ok(SearchResults::from_ranked(
            self.hits.iter().take(k).cloned().collect(),
        ))
    }

    async fn add(&self, _chunks: Vec<IndexedChunk>) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _ids: &[String]) -> Result<usize> {
        Ok(0)
    }

    async fn list(&self) -> Result<Vec<IndexedChunk>> {
        Ok(self.hits.iter().map(|(c, _)| c.clone()).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.hits.len())
    }
}

pub fn chunk(source: &str, text: &str) -> IndexedChunk {
    IndexedChunk {
        id: format!("{}_chunk_0", source),
        text: text.to_string(),
        metadata: ChunkMetadata {
            source: source.to_string(),
            chunk_index: 0,
            total_chunks: 1,
            chunk_size: text.len(),
            chunk_strategy: "sentence".to_string(),
            chunk_overlap: 0,
            file_type: "text/plain".to_string(),
            file_size: text.len(),
            upload_type: UploadType::UserUpload,
            uploaded_at: Utc::now(),
        },
    }
}

pub fn session() -> ConversationSession {
    ConversationSession::new(TokenBudget::default(), Arc::new(WordBasedEstimator::default()))
}

pub fn client(script: &Arc<Script>, sleeper: &Arc<RecordingSleeper>) -> ProviderClient {
    ProviderClient::new(
        Arc::new(ScriptedFactory {
            script: Arc::clone(script),
        }),
        RetryPolicy::default(),
    )
    .with_sleeper(Arc::clone(sleeper) as Arc<dyn Sleeper>)
}

pub fn orchestrator(
    index: Arc<dyn DocumentIndex>,
    script: &Arc<Script>,
    sleeper: &Arc<RecordingSleeper>,
) -> QueryOrchestrator {
    let chunker = Box::new(rag_assistant::ingest::chunking::SentenceChunker::new(ChunkingConfig {
        chunk_size: 80,
        chunk_overlap: 0,
        min_chunk_size: 10,
        ..ChunkingConfig::default()
    }));
    QueryOrchestrator::new(DocumentLibrary::new(index, chunker), client(script, sleeper))
}

pub fn server_error() -> ProviderError {
    ProviderError::ServerError {
        status: 500,
        message: "Internal Server Error".to_string(),
    }
}

pub fn groq_credentials() -> Credentials {
    Credentials::new().with_key(Provider::Groq, "gsk-test")
}
