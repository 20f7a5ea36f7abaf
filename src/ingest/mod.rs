//! Document ingestion and management
//!
//! [`DocumentLibrary`] turns uploaded files into indexed chunks and manages
//! them by file name. Chunk ids are derived from the file name, the chunk
//! position and a hash of the chunk text, so re-ingesting the same file
//! yields the same ids.

pub mod chunking;

use crate::error::{RagError, Result};
use crate::index::{ChunkMetadata, DocumentIndex, IndexedChunk, UploadType};
use crate::metrics::METRICS;
use bytes::Bytes;
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use chunking::{create_chunker, Chunk, Chunker, ChunkingConfig};

/// A file handed to the assistant
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn file_type(&self) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(&self.name).to_string())
    }
}

fn guess_content_type(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match extension.as_deref() {
        Some("md") | Some("markdown") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        _ => "text/plain",
    }
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub name: String,
    pub ids: Vec<String>,
}

impl UploadReceipt {
    pub fn chunks(&self) -> usize {
        self.ids.len()
    }
}

impl fmt::Display for UploadReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully uploaded and indexed {} ({} chunks)",
            self.name,
            self.chunks()
        )
    }
}

/// One user-uploaded document as listed to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: usize,
    pub chunks: usize,
    pub ids: Vec<String>,
}

/// Number of chunks removed by [`DocumentLibrary::clear_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearReport(pub usize);

impl fmt::Display for ClearReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            f.write_str("No documents found to clear")
        } else {
            write!(f, "Successfully cleared {} documents", self.0)
        }
    }
}

/// Deterministic id for chunk `index` of `file_name`
pub fn chunk_id(file_name: &str, index: usize, text: &str) -> String {
    let digest = hex::encode(Sha256::digest(text.as_bytes()));
    format!("{}_chunk_{}_{}", file_name, index, &digest[..16])
}

/// Ingests files into a [`DocumentIndex`]
pub struct DocumentLibrary {
    index: Arc<dyn DocumentIndex>,
    chunker: Box<dyn Chunker>,
}

impl DocumentLibrary {
    pub fn new(index: Arc<dyn DocumentIndex>, chunker: Box<dyn Chunker>) -> Self {
        Self { index, chunker }
    }

    pub fn index(&self) -> &Arc<dyn DocumentIndex> {
        &self.index
    }

    /// Chunk and index a user upload; file names must be unique
    pub async fn upload(&self, file: UploadedFile) -> Result<UploadReceipt> {
        let existing = self.index.list().await?;
        if existing.iter().any(|c| is_user_upload_of(c, &file.name)) {
            warn!("Rejected duplicate upload of {}", file.name);
            return Err(RagError::DuplicateDocument(file.name));
        }

        let ids = self.ingest(&file, UploadType::UserUpload).await?;
        info!("Indexed {} as {} chunks", file.name, ids.len());
        Ok(UploadReceipt {
            name: file.name,
            ids,
        })
    }

    async fn ingest(&self, file: &UploadedFile, upload_type: UploadType) -> Result<Vec<String>> {
        let text = std::str::from_utf8(&file.data)
            .map_err(|_| RagError::UnsupportedEncoding(file.name.clone()))?;
        if text.trim().is_empty() {
            return Err(RagError::EmptyDocument(file.name.clone()));
        }

        let config = self.chunker.config();
        let file_type = file.file_type();
        let uploaded_at = Utc::now();

        let chunks: Vec<IndexedChunk> = self
            .chunker
            .chunk(text)
            .into_iter()
            .map(|chunk| IndexedChunk {
                id: chunk_id(&file.name, chunk.chunk_index, &chunk.text),
                metadata: ChunkMetadata {
                    source: file.name.clone(),
                    chunk_index: chunk.chunk_index,
                    total_chunks: chunk.total_chunks,
                    chunk_size: chunk.chunk_size,
                    chunk_strategy: config.strategy.clone(),
                    chunk_overlap: config.chunk_overlap,
                    file_type: file_type.clone(),
                    file_size: file.data.len(),
                    upload_type,
                    uploaded_at,
                },
                text: chunk.text,
            })
            .collect();

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        debug!("Adding {} chunks from {}", ids.len(), file.name);
        self.index.add(chunks).await?;
        METRICS.record_chunks_indexed(ids.len());
        Ok(ids)
    }

    /// Remove an uploaded document by file name, or a single chunk by id
    pub async fn delete(&self, doc_id: &str) -> Result<usize> {
        let chunks = self.index.list().await?;
        let mut ids: Vec<String> = chunks
            .iter()
            .filter(|c| is_user_upload_of(c, doc_id))
            .map(|c| c.id.clone())
            .collect();

        if ids.is_empty() && chunks.iter().any(|c| c.id == doc_id) {
            ids.push(doc_id.to_string());
        }
        if ids.is_empty() {
            return Err(RagError::DocumentNotFound(doc_id.to_string()));
        }

        let removed = self.index.delete(&ids).await?;
        info!("Deleted {} chunks for {}", removed, doc_id);
        Ok(removed)
    }

    /// User uploads grouped by file name, sorted by name
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let mut documents: IndexMap<String, DocumentSummary> = IndexMap::new();
        for chunk in self.index.list().await? {
            if chunk.metadata.upload_type != UploadType::UserUpload {
                continue;
            }
            let entry = documents
                .entry(chunk.metadata.source.clone())
                .or_insert_with(|| DocumentSummary {
                    name: chunk.metadata.source.clone(),
                    file_type: chunk.metadata.file_type.clone(),
                    size: chunk.metadata.file_size,
                    chunks: 0,
                    ids: Vec::new(),
                });
            entry.chunks += 1;
            entry.ids.push(chunk.id);
        }

        let mut documents: Vec<DocumentSummary> = documents.into_values().collect();
        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(documents)
    }

    /// Remove every chunk from the index
    pub async fn clear_all(&self) -> Result<ClearReport> {
        let ids: Vec<String> = self.index.list().await?.into_iter().map(|c| c.id).collect();
        if ids.is_empty() {
            return Ok(ClearReport(0));
        }
        let removed = self.index.delete(&ids).await?;
        info!("Cleared {} chunks", removed);
        Ok(ClearReport(removed))
    }

    /// Index every readable text file under `dir`, only when the index is empty
    pub async fn load_directory(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        if self.index.count().await? > 0 {
            info!("Index already populated, skipping {}", dir.display());
            return Ok(0);
        }
        if !dir.is_dir() {
            warn!("Data directory {} does not exist", dir.display());
            return Ok(0);
        }

        let pattern = format!("{}/**/*", dir.display());
        let paths = glob::glob(&pattern).map_err(|e| RagError::Configuration(e.to_string()))?;

        let mut indexed = 0;
        for path in paths {
            let path = match path {
                Ok(path) if path.is_file() => path,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping unreadable path: {}", e);
                    continue;
                }
            };

            let name = path
                .strip_prefix(dir)
                .unwrap_or(path.as_path())
                .to_string_lossy()
                .to_string();
            let data = tokio::fs::read(&path).await?;
            let file = UploadedFile::new(name, data);

            match self.ingest(&file, UploadType::Directory).await {
                Ok(ids) => indexed += ids.len(),
                Err(e @ (RagError::UnsupportedEncoding(_) | RagError::EmptyDocument(_))) => {
                    warn!("Skipping {}: {}", path.display(), e);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Loaded {} chunks from {}", indexed, dir.display());
        Ok(indexed)
    }
}

fn is_user_upload_of(chunk: &IndexedChunk, name: &str) -> bool {
    chunk.metadata.upload_type == UploadType::UserUpload && chunk.metadata.source == name
}
