//! Document index abstraction
//!
//! The assistant only needs similarity search plus add/delete/list keyed by
//! chunk id. Distances are cosine distances, smaller is closer.

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::InMemoryIndex;

/// How a chunk entered the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadType {
    UserUpload,
    Directory,
}

/// Metadata stored alongside each chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Original file name
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Characters in this chunk
    pub chunk_size: usize,
    pub chunk_strategy: String,
    pub chunk_overlap: usize,
    pub file_type: String,
    /// Bytes in the original file
    pub file_size: usize,
    pub upload_type: UploadType,
    pub uploaded_at: DateTime<Utc>,
}

/// A chunk as stored in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Result of one search, one batch per query (always a single batch here)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub ids: Vec<Vec<String>>,
    pub documents: Vec<Vec<String>>,
    pub distances: Vec<Vec<f32>>,
    pub metadatas: Vec<Vec<ChunkMetadata>>,
}

/// One row of [`SearchResults`]
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub id: &'a str,
    pub document: &'a str,
    pub distance: f32,
    pub metadata: Option<&'a ChunkMetadata>,
}

impl SearchResults {
    /// Wrap ranked chunks as a single batch
    pub fn from_ranked(ranked: Vec<(IndexedChunk, f32)>) -> Self {
        let mut ids = Vec::with_capacity(ranked.len());
        let mut documents = Vec::with_capacity(ranked.len());
        let mut distances = Vec::with_capacity(ranked.len());
        let mut metadatas = Vec::with_capacity(ranked.len());
        for (chunk, distance) in ranked {
            ids.push(chunk.id);
            documents.push(chunk.text);
            distances.push(distance);
            metadatas.push(chunk.metadata);
        }
        Self {
            ids: vec![ids],
            documents: vec![documents],
            distances: vec![distances],
            metadatas: vec![metadatas],
        }
    }

    /// Rows of the first batch, in ranking order
    pub fn hits(&self) -> impl Iterator<Item = SearchHit<'_>> {
        let ids = self.ids.first().map(Vec::as_slice).unwrap_or_default();
        let documents = self.documents.first().map(Vec::as_slice).unwrap_or_default();
        let distances = self.distances.first().map(Vec::as_slice).unwrap_or_default();
        let metadatas = self.metadatas.first().map(Vec::as_slice).unwrap_or_default();

        ids.iter()
            .zip(documents)
            .zip(distances)
            .enumerate()
            .map(move |(i, ((id, document), distance))| SearchHit {
                id,
                document,
                distance: *distance,
                metadata: metadatas.get(i),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.hits().next().is_none()
    }

    /// Smallest distance in the first batch
    pub fn best_distance(&self) -> Option<f32> {
        self.hits().map(|h| h.distance).reduce(f32::min)
    }
}

/// Similarity-searchable chunk store
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Up to `k` chunks closest to `query`, ascending distance
    async fn search(&self, query: &str, k: usize) -> Result<SearchResults>;

    /// Insert chunks, replacing any with the same id
    async fn add(&self, chunks: Vec<IndexedChunk>) -> Result<()>;

    /// Remove chunks by id, returning how many existed
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Every stored chunk, in insertion order
    async fn list(&self) -> Result<Vec<IndexedChunk>>;

    async fn count(&self) -> Result<usize>;
}
