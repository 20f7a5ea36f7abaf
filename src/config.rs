//! Layered configuration
//!
//! Values come from serde defaults, then an optional TOML file, then
//! `RAG__SECTION__KEY` environment variables (e.g. `RAG__MEMORY__TOKEN_LIMIT`).

use crate::context::TokenBudgetConfig;
use crate::error::{RagError, Result};
use crate::ingest::ChunkingConfig;
use crate::providers::{Provider, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub memory: TokenBudgetConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Directory bulk-indexed at startup when the index is empty
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory: TokenBudgetConfig::default(),
            retrieval: RetrievalConfig::default(),
            retry: RetryPolicy::default(),
            providers: ProvidersConfig::default(),
            chunking: ChunkingConfig::default(),
            logging: LoggingConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load `config.toml` (if present) and environment overrides
    pub fn load() -> Result<Self> {
        Self::from_file("config")
    }

    /// Load from the given file (extension optional, file may be absent)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().to_string();
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(&path).required(false))
            .add_source(
                ::config::Environment::with_prefix("RAG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        self.memory
            .validate()
            .map_err(|e| RagError::Configuration(e.to_string()))?;

        if !(0.0..=2.0).contains(&self.retrieval.relevance_ceiling) {
            return Err(RagError::Configuration(format!(
                "relevance_ceiling must be a cosine distance in [0, 2], got {}",
                self.retrieval.relevance_ceiling
            )));
        }
        if self.retrieval.n_results == 0 {
            return Err(RagError::Configuration(
                "n_results must be greater than zero".to_string(),
            ));
        }

        self.chunking.validate()
    }
}

/// Retrieval settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_n_results")]
    pub n_results: usize,

    /// Best-match distance above which the question is not answered
    #[serde(default = "default_relevance_ceiling")]
    pub relevance_ceiling: f32,
}

fn default_n_results() -> usize { 3 }
fn default_relevance_ceiling() -> f32 { 0.7 }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_results: default_n_results(),
            relevance_ceiling: default_relevance_ceiling(),
        }
    }
}

/// Where and how to reach one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> usize { 2048 }
fn default_timeout_secs() -> u64 { 60 }

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Endpoints for all four providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_groq")]
    pub groq: ProviderEndpoint,

    #[serde(default = "default_openai")]
    pub openai: ProviderEndpoint,

    #[serde(default = "default_gemini")]
    pub gemini: ProviderEndpoint,

    #[serde(default = "default_deepseek")]
    pub deepseek: ProviderEndpoint,
}

fn default_groq() -> ProviderEndpoint {
    ProviderEndpoint::new("https://api.groq.com/openai/v1", "llama-3.1-8b-instant")
}

fn default_openai() -> ProviderEndpoint {
    ProviderEndpoint::new("https://api.openai.com/v1", "gpt-3.5-turbo")
}

fn default_gemini() -> ProviderEndpoint {
    ProviderEndpoint::new("https://generativelanguage.googleapis.com", "gemini-1.5-flash")
}

fn default_deepseek() -> ProviderEndpoint {
    ProviderEndpoint::new("https://api.deepseek.com", "deepseek-chat")
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            groq: default_groq(),
            openai: default_openai(),
            gemini: default_gemini(),
            deepseek: default_deepseek(),
        }
    }
}

impl ProvidersConfig {
    pub fn endpoint(&self, provider: Provider) -> &ProviderEndpoint {
        match provider {
            Provider::Groq => &self.groq,
            Provider::OpenAi => &self.openai,
            Provider::Gemini => &self.gemini,
            Provider::Deepseek => &self.deepseek,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "rag_assistant=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.memory.token_limit, 8000);
        assert_eq!(config.retrieval.n_results, 3);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.providers.endpoint(Provider::Deepseek).model, "deepseek-chat");
        assert_eq!(config.providers.groq.timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
data_dir = "docs"

[memory]
token_limit = 4000

[providers.gemini]
base_url = "http://localhost:9999"
model = "gemini-test"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.memory.token_limit, 4000);
        assert_eq!(config.memory.summarize_threshold, 0.7);
        assert_eq!(config.providers.gemini.model, "gemini-test");
        assert_eq!(config.providers.gemini.max_tokens, 2048);
        assert_eq!(config.providers.groq, default_groq());
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.data_dir, PathBuf::from("docs"));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[memory]\nsummarize_threshold = 0.1\nquestion_threshold = 0.5"
        )
        .unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }
}
