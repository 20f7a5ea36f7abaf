//! Gemini `generateContent` adapter
//!
//! Gemini has no chat roles in this integration: the message sequence is
//! flattened into one prompt of `Role: content` blocks.

use super::openai_compat::classify_status;
use super::{Provider, ProviderError, TextGenerationBackend};
use crate::config::ProviderEndpoint;
use crate::context::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub struct GeminiBackend {
    http: Client,
    endpoint: ProviderEndpoint,
    api_key: SecretString,
}

impl GeminiBackend {
    pub fn new(endpoint: ProviderEndpoint, api_key: SecretString) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .map_err(|e| ProviderError::Other(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }

    fn generate_endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.base_url.trim_end_matches('/'),
            self.endpoint.model
        )
    }

    /// Flatten the conversation into a single prompt
    pub(crate) fn flatten(messages: &[ChatMessage]) -> String {
        messages
            .iter()
            .map(|m| format!("{}: {}\n\n", m.role().label(), m.content()))
            .collect()
    }
}

#[async_trait]
impl TextGenerationBackend for GeminiBackend {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let payload = GeminiGenerateRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: Self::flatten(messages),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.endpoint.max_tokens,
                temperature,
            },
        };

        debug!(model = %self.endpoint.model, "Sending generateContent request");

        let response = self
            .http
            .post(self.generate_endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Gemini returned error");
            return Err(classify_status(status.as_u16(), &body));
        }

        let body: GeminiGenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("missing candidate in response".to_string()))?;

        let text = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "candidate has no text parts".to_string(),
            ));
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct GeminiGenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiGenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}
