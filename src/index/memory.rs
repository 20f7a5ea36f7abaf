//! In-process index ranking chunks by term-frequency cosine distance

use super::{DocumentIndex, IndexedChunk, SearchResults};
use crate::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Term-frequency vector with a cached norm
#[derive(Debug, Clone, Default)]
struct TermVector {
    weights: HashMap<String, f32>,
    norm: f32,
}

impl TermVector {
    fn embed(text: &str) -> Self {
        let mut weights: HashMap<String, f32> = HashMap::new();
        for term in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            *weights.entry(term.to_lowercase()).or_insert(0.0) += 1.0;
        }
        let norm = weights.values().map(|w| w * w).sum::<f32>().sqrt();
        Self { weights, norm }
    }

    /// `1 - cosine`, 1.0 when either side has no terms
    fn distance(&self, other: &TermVector) -> f32 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 1.0;
        }
        let (small, large) = if self.weights.len() <= other.weights.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f32 = small
            .weights
            .iter()
            .filter_map(|(term, w)| large.weights.get(term).map(|v| w * v))
            .sum();
        (1.0 - dot / (self.norm * other.norm)).clamp(0.0, 2.0)
    }
}

struct Entry {
    chunk: IndexedChunk,
    vector: TermVector,
}

/// Index held entirely in memory
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<IndexMap<String, Entry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentIndex for InMemoryIndex {
    async fn search(&self, query: &str, k: usize) -> Result<SearchResults> {
        let query_vector = TermVector::embed(query);
        let entries = self.entries.read().await;

        let mut ranked: Vec<(&Entry, f32)> = entries
            .values()
            .map(|e| (e, e.vector.distance(&query_vector)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(k);

        debug!(
            "Index search returned {} of {} chunks, best distance {:?}",
            ranked.len(),
            entries.len(),
            ranked.first().map(|r| r.1)
        );

        Ok(SearchResults::from_ranked(
            ranked
                .into_iter()
                .map(|(e, d)| (e.chunk.clone(), d))
                .collect(),
        ))
    }

    async fn add(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        let mut entries = self.entries.write().await;
        for chunk in chunks {
            let vector = TermVector::embed(&chunk.text);
            entries.insert(chunk.id.clone(), Entry { chunk, vector });
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut entries = self.entries.write().await;
        Ok(ids
            .iter()
            .filter(|id| entries.shift_remove(id.as_str()).is_some())
            .count())
    }

    async fn list(&self) -> Result<Vec<IndexedChunk>> {
        let entries = self.entries.read().await;
        Ok(entries.values().map(|e| e.chunk.clone()).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}
