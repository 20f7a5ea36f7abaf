//! OpenAI-compatible chat completions adapter
//!
//! Serves Groq, OpenAI and Deepseek, which all expose
//! `POST {base_url}/chat/completions` with bearer authentication.

use super::{Provider, ProviderError, TextGenerationBackend};
use crate::config::ProviderEndpoint;
use crate::context::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub struct OpenAiCompatBackend {
    provider: Provider,
    http: Client,
    endpoint: ProviderEndpoint,
    api_key: SecretString,
}

impl OpenAiCompatBackend {
    pub fn new(
        provider: Provider,
        endpoint: ProviderEndpoint,
        api_key: SecretString,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| ProviderError::Other(e.to_string()))?;

        Ok(Self {
            provider,
            http,
            endpoint,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.endpoint.base_url.trim_end_matches('/')
        )
    }

    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage<'_>> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role().as_str(),
                content: m.content(),
            })
            .collect()
    }
}

/// Map a non-success status and body into a backend error
pub(crate) fn classify_status(status: u16, body: &str) -> ProviderError {
    let message = extract_error_message(body);
    match status {
        429 => ProviderError::RateLimited(message),
        503 => ProviderError::Unavailable(message),
        500..=599 => ProviderError::ServerError { status, message },
        _ => ProviderError::Api { status, message },
    }
}

/// Pull `error.message` out of a JSON error body, falling back to the raw text
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "no error details".to_string()
            } else {
                body.trim().to_string()
            }
        })
}

#[async_trait]
impl TextGenerationBackend for OpenAiCompatBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let request = ChatCompletionRequest {
            model: &self.endpoint.model,
            messages: Self::to_api_messages(messages),
            temperature,
            max_tokens: self.endpoint.max_tokens,
        };

        debug!(
            provider = %self.provider,
            model = %self.endpoint.model,
            messages = messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.provider, status = status.as_u16(), "Provider returned error");
            return Err(classify_status(status.as_u16(), &body));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}
