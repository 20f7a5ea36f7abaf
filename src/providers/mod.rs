//! Text-generation backends
//!
//! All four remote LLM services sit behind [`TextGenerationBackend`]. Groq,
//! OpenAI and Deepseek speak the OpenAI chat-completions dialect and share
//! [`OpenAiCompatBackend`]; Gemini has its own adapter. Each adapter maps
//! HTTP failures into [`ProviderError`], which is where a backend decides
//! what counts as transient. The shared retry loop lives in [`retry`].

pub mod client;
pub mod credentials;
pub mod gemini;
pub mod openai_compat;
pub mod retry;

use crate::config::ProvidersConfig;
use crate::context::ChatMessage;
use crate::error::AssistantError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use client::ProviderClient;
pub use credentials::{Credentials, InMemoryKeyStore, KeyStore};
pub use gemini::GeminiBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

/// The closed set of supported LLM services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Groq,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Deepseek,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Groq,
        Provider::OpenAi,
        Provider::Gemini,
        Provider::Deepseek,
    ];

    /// Lowercase identifier used in configuration and the key store
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Deepseek => "deepseek",
        }
    }

    /// Human-readable list of the other providers, e.g. "Groq, Gemini, or Deepseek"
    pub fn alternatives(&self) -> String {
        let others: Vec<String> = Self::ALL
            .iter()
            .filter(|p| *p != self)
            .map(|p| p.to_string())
            .collect();
        match others.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{}, or {}", rest.join(", "), last),
            Some((last, _)) => last.clone(),
            None => String::new(),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Groq => "Groq",
            Provider::OpenAi => "OpenAI",
            Provider::Gemini => "Gemini",
            Provider::Deepseek => "Deepseek",
        };
        f.write_str(name)
    }
}

impl FromStr for Provider {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            "deepseek" => Ok(Provider::Deepseek),
            _ => Err(AssistantError::UnknownProvider(s.to_string())),
        }
    }
}

/// Backend-level failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Whether the retry loop should try again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::ServerError { .. } | ProviderError::Unavailable(_)
        )
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            ProviderError::ServerError { .. } => "server_error",
            ProviderError::Unavailable(_) => "unavailable",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Connection(_) => "connection",
            ProviderError::Api { .. } => "api_error",
            ProviderError::InvalidResponse(_) => "invalid_response",
            ProviderError::Other(_) => "other",
        }
    }

    /// Map a transport failure from reqwest
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ProviderError::Connection(err.to_string())
        } else {
            ProviderError::Other(err.to_string())
        }
    }
}

/// Uniform chat capability over one remote API
#[async_trait]
pub trait TextGenerationBackend: Send + Sync {
    /// Which service this backend talks to
    fn provider(&self) -> Provider;

    /// Send the message sequence and return the generated text
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, ProviderError>;
}

/// Builds a backend for a provider and a resolved key
pub trait BackendFactory: Send + Sync {
    fn build(
        &self,
        provider: Provider,
        api_key: &SecretString,
    ) -> Result<Box<dyn TextGenerationBackend>, ProviderError>;
}

/// Factory producing the real HTTP adapters
#[derive(Debug, Clone, Default)]
pub struct HttpBackendFactory {
    config: ProvidersConfig,
}

impl HttpBackendFactory {
    pub fn new(config: ProvidersConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for HttpBackendFactory {
    fn build(
        &self,
        provider: Provider,
        api_key: &SecretString,
    ) -> Result<Box<dyn TextGenerationBackend>, ProviderError> {
        let endpoint = self.config.endpoint(provider).clone();
        let api_key = copy_secret(api_key);
        match provider {
            Provider::Gemini => Ok(Box::new(GeminiBackend::new(endpoint, api_key)?)),
            _ => Ok(Box::new(OpenAiCompatBackend::new(provider, endpoint, api_key)?)),
        }
    }
}

pub(crate) fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("groq".parse::<Provider>().unwrap(), Provider::Groq);
        assert_eq!(" OpenAI ".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert!(matches!(
            "claude".parse::<Provider>(),
            Err(AssistantError::UnknownProvider(name)) if name == "claude"
        ));
    }

    #[test]
    fn test_alternatives() {
        assert_eq!(Provider::Groq.alternatives(), "OpenAI, Gemini, or Deepseek");
        assert_eq!(Provider::Deepseek.alternatives(), "Groq, OpenAI, or Gemini");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::ServerError {
            status: 500,
            message: String::new()
        }
        .is_transient());
        assert!(ProviderError::Unavailable("down".into()).is_transient());
        assert!(!ProviderError::RateLimited("slow down".into()).is_transient());
        assert!(!ProviderError::Connection("refused".into()).is_transient());
        assert!(!ProviderError::Api {
            status: 401,
            message: "bad key".into()
        }
        .is_transient());
    }

    #[test]
    fn test_factory_builds_matching_backend() {
        let factory = HttpBackendFactory::default();
        let key = SecretString::new("test-key".to_string());
        for provider in Provider::ALL {
            let backend = factory.build(provider, &key).unwrap();
            assert_eq!(backend.provider(), provider);
        }
    }
}
