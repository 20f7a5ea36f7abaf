//! Text chunking strategies
//!
//! Every strategy produces raw pieces; [`Chunker::chunk`] then drops pieces
//! shorter than `min_chunk_size` and numbers what is left. Sizes are in
//! characters except for the `token` strategy, which counts cl100k tokens.

use crate::error::{RagError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Chunking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// One of `sentence`, `token`, `fixed`, `semantic`
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Preferred break point for the `fixed` strategy
    #[serde(default = "default_separator")]
    pub separator: String,

    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

fn default_chunk_size() -> usize { 512 }
fn default_chunk_overlap() -> usize { 50 }
fn default_strategy() -> String { "sentence".to_string() }
fn default_separator() -> String { " ".to_string() }
fn default_min_chunk_size() -> usize { 100 }
fn default_max_chunk_size() -> usize { 2048 }

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            strategy: default_strategy(),
            separator: default_separator(),
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(RagError::Configuration(format!(
                "min_chunk_size ({}) exceeds max_chunk_size ({})",
                self.min_chunk_size, self.max_chunk_size
            )));
        }
        if !matches!(
            self.strategy.as_str(),
            "sentence" | "token" | "fixed" | "semantic"
        ) {
            return Err(RagError::Configuration(format!(
                "unknown chunking strategy '{}'",
                self.strategy
            )));
        }
        Ok(())
    }
}

/// One piece of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Characters in `text`
    pub chunk_size: usize,
}

/// Splits documents into chunks
pub trait Chunker: Send + Sync {
    fn config(&self) -> &ChunkingConfig;

    /// Raw pieces before size filtering
    fn split_text(&self, text: &str) -> Vec<String>;

    /// Filtered, numbered chunks; empty only for blank text
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let min = self.config().min_chunk_size;
        let mut pieces: Vec<String> = self
            .split_text(text)
            .into_iter()
            .filter(|p| p.trim().chars().count() >= min)
            .collect();

        if pieces.is_empty() {
            pieces.push(text.to_string());
        }

        let total_chunks = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                chunk_size: text.chars().count(),
                text,
                chunk_index,
                total_chunks,
            })
            .collect()
    }
}

/// Build the strategy named in `config`
pub fn create_chunker(config: ChunkingConfig, bpe: Arc<CoreBPE>) -> Result<Box<dyn Chunker>> {
    config.validate()?;
    Ok(match config.strategy.as_str() {
        "token" => Box::new(TokenChunker { config, bpe }),
        "fixed" => Box::new(FixedChunker { config }),
        "semantic" => Box::new(SemanticChunker { config }),
        _ => Box::new(SentenceChunker { config }),
    })
}

/// Packs whole sentences up to `chunk_size` characters, then overlaps neighbours
pub struct SentenceChunker {
    config: ChunkingConfig,
}

impl SentenceChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }
}

impl Chunker for SentenceChunker {
    fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    fn split_text(&self, text: &str) -> Vec<String> {
        let packed = pack_sentences(text, self.config.chunk_size);
        apply_overlap(packed, self.config.chunk_overlap)
    }
}

/// Sentence packing at twice the configured size
pub struct SemanticChunker {
    config: ChunkingConfig,
}

impl Chunker for SemanticChunker {
    fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    fn split_text(&self, text: &str) -> Vec<String> {
        let packed = pack_sentences(text, self.config.chunk_size * 2);
        apply_overlap(packed, self.config.chunk_overlap)
    }
}

/// Windows of `chunk_size` tokens stepping by `chunk_size - chunk_overlap`
pub struct TokenChunker {
    config: ChunkingConfig,
    bpe: Arc<CoreBPE>,
}

impl TokenChunker {
    /// Decode a token window, shrinking it when it ends inside a multi-byte character
    fn decode_window(&self, tokens: &[usize]) -> Option<String> {
        let mut end = tokens.len();
        while end > 0 && tokens.len() - end < 4 {
            if let Ok(text) = self.bpe.decode(tokens[..end].to_vec()) {
                return Some(text);
            }
            end -= 1;
        }
        None
    }
}

impl Chunker for TokenChunker {
    fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    fn split_text(&self, text: &str) -> Vec<String> {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= self.config.chunk_size {
            return vec![text.to_string()];
        }

        let step = self.config.chunk_size - self.config.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < tokens.len() {
            let end = (start + self.config.chunk_size).min(tokens.len());
            match self.decode_window(&tokens[start..end]) {
                Some(chunk) => chunks.push(chunk),
                None => warn!("Skipping undecodable token window at {}", start),
            }
            start += step;
        }
        chunks
    }
}

/// Character windows broken at the last separator when possible
pub struct FixedChunker {
    config: ChunkingConfig,
}

impl Chunker for FixedChunker {
    fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let size = self.config.chunk_size;
        if chars.len() <= size {
            return vec![text.to_string()];
        }

        let separator: Vec<char> = self.config.separator.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = (start + size).min(chars.len());
            if end < chars.len() && !separator.is_empty() {
                if let Some(cut) = rfind_chars(&chars[start..end], &separator) {
                    if cut > self.config.min_chunk_size {
                        end = start + cut;
                    }
                }
            }
            chunks.push(chars[start..end].iter().collect());
            if end >= chars.len() {
                break;
            }
            start = end.saturating_sub(self.config.chunk_overlap).max(start + 1);
        }
        chunks
    }
}

fn rfind_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

/// Sentence terminator followed by whitespace
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("valid sentence boundary pattern"));

/// Split after `.`, `!` or `?` followed by whitespace, keeping the terminator
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        // terminators are single-byte ASCII
        sentences.push(&text[start..boundary.start() + 1]);
        start = boundary.end();
    }
    sentences.push(&text[start..]);
    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn pack_sentences(text: &str, chunk_size: usize) -> Vec<String> {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0;
    for sentence in sentences {
        let sentence_size = sentence.chars().count();
        if current_size + sentence_size > chunk_size && !current.is_empty() {
            chunks.push(current.join(" "));
            current = vec![sentence];
            current_size = sentence_size;
        } else {
            current.push(sentence);
            current_size += sentence_size + 1;
        }
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

/// Prefix each chunk with the tail of its predecessor and suffix it with the head of its successor
fn apply_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if chunks.len() <= 1 || overlap == 0 {
        return chunks;
    }

    (0..chunks.len())
        .map(|i| {
            let mut out = String::new();
            if i > 0 {
                out.push_str(tail_chars(&chunks[i - 1], overlap));
                out.push(' ');
            }
            out.push_str(&chunks[i]);
            if i + 1 < chunks.len() {
                out.push(' ');
                out.push_str(head_chars(&chunks[i + 1], overlap));
            }
            out
        })
        .collect()
}

fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiktoken_rs::cl100k_base;

    fn config(strategy: &str, chunk_size: usize, overlap: usize, min: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap: overlap,
            strategy: strategy.to_string(),
            min_chunk_size: min,
            ..ChunkingConfig::default()
        }
    }

    fn bpe() -> Arc<CoreBPE> {
        Arc::new(cl100k_base().unwrap())
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("First one. Second!  Third?Still third. ");
        assert_eq!(sentences, vec!["First one.", "Second!", "Third?Still third."]);
    }

    #[test]
    fn test_split_sentences_mixed_whitespace() {
        assert_eq!(split_sentences("a. b!  c?\nd"), vec!["a.", "b!", "c?", "d"]);
        assert_eq!(split_sentences("no terminator here"), vec!["no terminator here"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_sentence_packing_without_overlap() {
        let chunker = SentenceChunker::new(config("sentence", 25, 0, 1));
        let pieces = chunker.split_text("Alpha beta. Gamma delta. Epsilon zeta.");
        assert_eq!(pieces, vec!["Alpha beta. Gamma delta.", "Epsilon zeta."]);
    }

    #[test]
    fn test_overlap_borrows_from_neighbours() {
        let out = apply_overlap(vec!["abcdef".to_string(), "ghijkl".to_string()], 3);
        assert_eq!(out, vec!["abcdef ghi".to_string(), "def ghijkl".to_string()]);
    }

    #[test]
    fn test_small_chunks_fall_back_to_whole_text() {
        let chunker = SentenceChunker::new(config("sentence", 512, 50, 100));
        let chunks = chunker.chunk("Tiny note.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Tiny note.");
        assert_eq!(chunks[0].total_chunks, 1);
        assert!(chunker.chunk("   ").is_empty());
    }

    #[test]
    fn test_chunk_numbering() {
        let chunker = SentenceChunker::new(config("sentence", 30, 0, 5));
        let text = "The first sentence is here. The second sentence is here. The third one.";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, 3);
            assert_eq!(chunk.chunk_size, chunk.text.chars().count());
        }
    }

    #[test]
    fn test_fixed_breaks_at_separator() {
        let chunker = FixedChunker {
            config: config("fixed", 12, 2, 3),
        };
        let pieces = chunker.split_text("aaaa bbbb cccc dddd");
        assert_eq!(pieces[0], "aaaa bbbb");
        assert!(pieces.last().unwrap().ends_with("dddd"));
    }

    #[test]
    fn test_fixed_handles_multibyte() {
        let chunker = FixedChunker {
            config: config("fixed", 4, 1, 0),
        };
        let pieces = chunker.split_text("ééééééé");
        assert!(pieces.iter().all(|p| p.chars().count() <= 4));
        assert_eq!(pieces[0], "éééé");
    }

    #[test]
    fn test_token_windows_overlap() {
        let bpe = bpe();
        let chunker = TokenChunker {
            config: config("token", 8, 2, 0),
            bpe: bpe.clone(),
        };
        let text = "one two three four five six seven eight nine ten eleven twelve thirteen";
        let pieces = chunker.split_text(text);
        assert!(pieces.len() >= 2);
        for piece in &pieces {
            assert!(bpe.encode_with_special_tokens(piece).len() <= 8);
        }
    }

    #[test]
    fn test_create_chunker_rejects_bad_config() {
        assert!(create_chunker(config("paragraph", 512, 50, 100), bpe()).is_err());
        assert!(create_chunker(config("sentence", 50, 50, 10), bpe()).is_err());
        let chunker = create_chunker(config("semantic", 512, 50, 100), bpe()).unwrap();
        assert_eq!(chunker.config().strategy, "semantic");
    }
}
