//! Summarization of older conversation history

use super::models::{format_transcript, ChatMessage};
use crate::providers::retry::{run_with_retry, RetryPolicy, Sleeper};
use crate::providers::{ProviderError, TextGenerationBackend};
use async_trait::async_trait;
use tracing::debug;

/// Temperature used for summary requests
pub const SUMMARY_TEMPERATURE: f32 = 0.1;

const SUMMARIZATION_PROMPT: &str = "You are an expert at summarizing conversations. \
Create a concise summary of the following chat conversation between a User and an AI Assistant.

Requirements:
- Capture the main topics discussed
- Include key questions asked and answers provided
- Maintain the conversational flow and context
- Keep it concise but informative (aim for 50-200 words)
- Focus on information that would be useful for future conversation context
- Use clear, professional language

Chat conversation to summarize:
{conversation}

Provide a clear and concise summary:";

/// Lines kept from each end of a long transcript by the fallback
const FALLBACK_EDGE: usize = 5;

/// Summarizer trait for different summarization strategies
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Compress `messages` into a short text body
    async fn summarize(&self, messages: &[ChatMessage]) -> Result<String, SummarizerError>;
}

/// Summarizer backed by the provider answering the current query
pub struct LlmSummarizer<'a> {
    backend: &'a dyn TextGenerationBackend,
    retry: &'a RetryPolicy,
    sleeper: &'a dyn Sleeper,
}

impl<'a> LlmSummarizer<'a> {
    pub fn new(
        backend: &'a dyn TextGenerationBackend,
        retry: &'a RetryPolicy,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            backend,
            retry,
            sleeper,
        }
    }

    fn build_prompt(messages: &[ChatMessage]) -> String {
        SUMMARIZATION_PROMPT.replace("{conversation}", &format_transcript(messages).join("\n"))
    }
}

#[async_trait]
impl<'a> Summarizer for LlmSummarizer<'a> {
    async fn summarize(&self, messages: &[ChatMessage]) -> Result<String, SummarizerError> {
        if messages.is_empty() {
            return Ok(String::new());
        }

        debug!(
            provider = %self.backend.provider(),
            "Summarizing {} messages",
            messages.len()
        );

        let request = [ChatMessage::user(Self::build_prompt(messages))];
        let summary = run_with_retry(
            self.retry,
            self.sleeper,
            self.backend.provider(),
            "Summarization",
            || self.backend.generate(&request, SUMMARY_TEMPERATURE),
        )
        .await?;

        let summary = summary.trim();
        if summary.is_empty() {
            return Err(SummarizerError::EmptySummary);
        }
        Ok(summary.to_string())
    }
}

/// Deterministic summarizer that never calls out
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatenationSummarizer;

impl ConcatenationSummarizer {
    /// Transcript of `messages`, elided in the middle when long
    pub fn fallback_summary(messages: &[ChatMessage]) -> String {
        let lines = format_transcript(messages);
        if lines.len() <= FALLBACK_EDGE * 2 {
            return lines.join("\n");
        }

        let omitted = lines.len() - FALLBACK_EDGE * 2;
        format!(
            "{}\n... [{} earlier messages omitted] ...\n{}\n\nIn total: {} messages summarized.",
            lines[..FALLBACK_EDGE].join("\n"),
            omitted,
            lines[lines.len() - FALLBACK_EDGE..].join("\n"),
            lines.len()
        )
    }
}

#[async_trait]
impl Summarizer for ConcatenationSummarizer {
    async fn summarize(&self, messages: &[ChatMessage]) -> Result<String, SummarizerError> {
        Ok(Self::fallback_summary(messages))
    }
}

/// Summarizer errors
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Provider returned an empty summary")]
    EmptySummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::retry::TokioSleeper;
    use crate::providers::Provider;
    use std::sync::Mutex;
    use std::time::Duration;

    struct CannedBackend {
        reply: Result<String, ProviderError>,
        prompts: Mutex<Vec<(String, f32)>>,
    }

    #[async_trait]
    impl TextGenerationBackend for CannedBackend {
        fn provider(&self) -> Provider {
            Provider::Deepseek
        }

        async fn generate(
            &self,
            messages: &[ChatMessage],
            temperature: f32,
        ) -> Result<String, ProviderError> {
            self.prompts
                .lock()
                .unwrap()
                .push((messages[0].content().to_string(), temperature));
            self.reply.clone()
        }
    }

    fn exchanges(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .flat_map(|i| {
                vec![
                    ChatMessage::user(format!("q{}", i)),
                    ChatMessage::assistant(format!("a{}", i)),
                ]
            })
            .collect()
    }

    #[tokio::test]
    async fn test_concatenation_summarizer_short() {
        let summary = ConcatenationSummarizer.summarize(&exchanges(2)).await.unwrap();
        assert_eq!(summary, "User: q0\nAssistant: a0\nUser: q1\nAssistant: a1");
    }

    #[test]
    fn test_fallback_elides_long_history() {
        let summary = ConcatenationSummarizer::fallback_summary(&exchanges(7));
        assert!(summary.starts_with("User: q0\nAssistant: a0"));
        assert!(summary.contains("... [4 earlier messages omitted] ..."));
        assert!(summary.contains("Assistant: a6"));
        assert!(summary.ends_with("In total: 14 messages summarized."));
        assert!(!summary.contains("q3"));
    }

    #[tokio::test]
    async fn test_llm_summarizer_uses_low_temperature() {
        let backend = CannedBackend {
            reply: Ok("  They discussed Rust.  ".to_string()),
            prompts: Mutex::new(Vec::new()),
        };
        let retry = RetryPolicy::new(0, Duration::from_millis(1));
        let summarizer = LlmSummarizer::new(&backend, &retry, &TokioSleeper);

        let summary = summarizer.summarize(&exchanges(1)).await.unwrap();
        assert_eq!(summary, "They discussed Rust.");

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].0.contains("User: q0\nAssistant: a0"));
        assert_eq!(prompts[0].1, SUMMARY_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_llm_summarizer_rejects_empty_output() {
        let backend = CannedBackend {
            reply: Ok("   ".to_string()),
            prompts: Mutex::new(Vec::new()),
        };
        let retry = RetryPolicy::default();
        let summarizer = LlmSummarizer::new(&backend, &retry, &TokioSleeper);

        assert!(matches!(
            summarizer.summarize(&exchanges(1)).await,
            Err(SummarizerError::EmptySummary)
        ));
    }
}
