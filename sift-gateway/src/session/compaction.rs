//! Conversation compaction: when to fold a session, and how.

use super::store::Session;
use crate::error::SiftError;
use crate::provider::{CompactRequest, Provider, RetryPolicy};
use sift_common::config::SessionsConfig;
use std::sync::Arc;

/// Decides whether a session is due for compaction.
#[derive(Debug, Clone)]
pub struct CompactionPolicy {
    pub enabled: bool,
    pub query_threshold: u64,
    pub token_threshold: u64,
}

impl CompactionPolicy {
    /// True when compaction is enabled, there is a conversation to fold and
    /// either usage counter has reached its threshold.
    pub fn is_due(&self, session: &Session) -> bool {
        self.enabled
            && session.has_continuation()
            && (session.query_count >= self.query_threshold
                || session.total_tokens >= self.token_threshold)
    }
}

impl From<&SessionsConfig> for CompactionPolicy {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            enabled: config.auto_compact,
            query_threshold: config.compact_query_threshold,
            token_threshold: config.compact_token_threshold,
        }
    }
}

/// Runs compaction calls against the provider with a fixed attempt budget.
pub struct Compactor {
    provider: Arc<dyn Provider>,
    model: String,
    retry: RetryPolicy,
}

impl Compactor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            model: model.into(),
            retry,
        }
    }

    /// Compact the session's conversation and return the new continuation token.
    ///
    /// Never touches the store; the caller applies the token and resets counters.
    pub async fn compact(&self, session: &Session) -> Result<String, SiftError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                self.retry.wait(attempt - 1).await;
            }

            let request = CompactRequest {
                model: self.model.clone(),
                previous_response_id: session.continuation_token.clone(),
            };

            match self.provider.compact(request).await {
                Ok(response) if !response.response_id.is_empty() => {
                    tracing::info!(
                        session_id = %session.id,
                        attempt = attempt + 1,
                        queries = session.query_count,
                        tokens = session.total_tokens,
                        "Session compacted"
                    );
                    return Ok(response.response_id);
                }
                Ok(_) => {
                    last_error = "provider returned an empty response id".into();
                }
                Err(e) => {
                    last_error = SiftError::from(&e).to_string();
                }
            }

            tracing::warn!(
                session_id = %session.id,
                attempt = attempt + 1,
                max_attempts,
                error = %last_error,
                "Compaction attempt failed"
            );
        }

        Err(SiftError::CompactionExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
