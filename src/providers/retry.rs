//! Shared retry loop with exponential backoff

use super::{Provider, ProviderError};
use crate::metrics::METRICS;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Retry configuration applied uniformly to every provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 2 means 3 attempts in total
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_max_retries() -> usize {
    2
}

fn default_backoff_base_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base_ms: backoff_base.as_millis() as u64,
        }
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Delay before retrying after the given (1-based) failed attempt
    pub fn backoff(&self, attempt: usize) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1) as u32);
        self.backoff_base().saturating_mul(multiplier)
    }
}

/// Something that can wait
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `call` until it succeeds, fails non-transiently, or retries run out
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    provider: Provider,
    operation: &str,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;

        match call().await {
            Ok(value) => {
                METRICS.record_provider_request(provider.as_str(), "success");
                return Ok(value);
            }
            Err(e) => {
                METRICS.record_provider_request(provider.as_str(), e.label());

                if !e.is_transient() {
                    error!(%provider, operation, "{} failed without retry: {}", operation, e);
                    return Err(e);
                }

                if attempt > policy.max_retries {
                    error!(%provider, operation, "{} failed after {} attempts: {}", operation, attempt, e);
                    return Err(e);
                }

                let backoff = policy.backoff(attempt);
                warn!(
                    %provider,
                    "{} attempt {} failed: {}, retrying in {:?}",
                    operation, attempt, e, backoff
                );
                METRICS.record_retry(provider.as_str());
                sleeper.sleep(backoff).await;
            }
        }
    }
}
