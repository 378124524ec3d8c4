//! Retry support for provider calls.
//!
//! [`RetryPolicy`] is a small attempt budget shared by the search path and
//! the compactor. [`RetryingProvider`] applies it to search calls, retrying
//! only transient failures with exponential backoff.

use super::{
    CompactRequest, CompactResponse, Provider, ProviderError, SearchRequest, SearchResponse,
};
use async_trait::async_trait;
use sift_common::config::ProviderConfig;
use std::sync::Arc;
use std::time::Duration;

/// Attempt budget with optional exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds (doubles with each retry). Zero disables sleeping.
    pub base_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 250,
            max_backoff_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    /// A fixed number of attempts with no delay between them.
    pub fn fixed(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Calculate backoff delay after the given zero-based attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .base_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(delay_ms)
    }

    /// Sleep before the next attempt, if this policy has a delay at all.
    pub async fn wait(&self, attempt: u32) {
        let delay = self.backoff_delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl From<&ProviderConfig> for RetryPolicy {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_retries.saturating_add(1),
            base_backoff_ms: config.base_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }
}

/// Wraps a provider and retries transient search failures.
///
/// Compaction calls pass straight through; the compactor owns their budget.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, ProviderError> {
        let provider_name = self.inner.name();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.inner.search(request.clone()).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            provider = provider_name,
                            attempt = attempt + 1,
                            "Provider recovered after retries"
                        );
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self.policy.backoff_delay(attempt);
                    tracing::warn!(
                        provider = provider_name,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    self.policy.wait(attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn compact(&self, request: CompactRequest) -> Result<CompactResponse, ProviderError> {
        self.inner.compact(request).await
    }
}
