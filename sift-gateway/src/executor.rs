//! Single external search call, shared by the session and batch paths.

use crate::error::SiftError;
use crate::provider::{Level, Provider, SearchRequest};
use serde::{Deserialize, Serialize};
use sift_common::config::QueryDefaultsConfig;
use std::sync::Arc;

/// Per-query knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub reasoning_effort: Level,
    pub search_context_size: Level,
    pub verbosity: Level,
    /// Free-form formatting instructions passed to the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_directive: Option<String>,
}

impl QueryOptions {
    /// Options from the configured defaults. Unparseable levels fall back to medium.
    pub fn from_defaults(defaults: &QueryDefaultsConfig) -> Self {
        Self {
            reasoning_effort: defaults.reasoning_effort.parse().unwrap_or_default(),
            search_context_size: defaults.search_context_size.parse().unwrap_or_default(),
            verbosity: defaults.verbosity.parse().unwrap_or_default(),
            format_directive: None,
        }
    }
}

/// Outcome of one call. On failure `text` holds the user-facing message,
/// `continuation_token` is empty and `tokens_used` is zero.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub text: String,
    pub continuation_token: String,
    pub tokens_used: u64,
    pub failure: Option<SiftError>,
}

impl QueryResult {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    fn failed(error: SiftError) -> Self {
        Self {
            text: error.user_message(),
            continuation_token: String::new(),
            tokens_used: 0,
            failure: Some(error),
        }
    }
}

/// Builds provider requests and turns responses into [`QueryResult`]s.
pub struct QueryExecutor {
    provider: Arc<dyn Provider>,
    model: String,
}

impl QueryExecutor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Run one query, continuing `continuation_token` when it is non-empty.
    /// Never fails; provider errors become a failed result.
    pub async fn execute(
        &self,
        query: &str,
        options: &QueryOptions,
        continuation_token: Option<&str>,
    ) -> QueryResult {
        let request = SearchRequest {
            model: self.model.clone(),
            input: query.to_string(),
            search_context_size: options.search_context_size,
            reasoning_effort: options.reasoning_effort,
            verbosity: options.verbosity,
            instructions: options
                .format_directive
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(String::from),
            store: true,
            previous_response_id: continuation_token
                .filter(|t| !t.is_empty())
                .map(String::from),
        };
        let continued = request.previous_response_id.is_some();

        match self.provider.search(request).await {
            Ok(response) if response.response_id.trim().is_empty() => {
                tracing::warn!(
                    provider = %response.provider,
                    continued,
                    "Search returned no response id"
                );
                QueryResult::failed(SiftError::ProviderUnknown(
                    "provider returned an empty response id".into(),
                ))
            }
            Ok(response) => {
                tracing::debug!(
                    provider = %response.provider,
                    continued,
                    tokens = response.usage.total_tokens,
                    latency_ms = response.latency_ms,
                    "Search completed"
                );
                QueryResult {
                    text: response.text,
                    continuation_token: response.response_id,
                    tokens_used: response.usage.total_tokens,
                    failure: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    provider = %e.provider,
                    status = e.status_code,
                    continued,
                    error = %e,
                    "Search failed"
                );
                QueryResult::failed(SiftError::from(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CompactRequest, CompactResponse, ProviderError, SearchResponse, TokenUsage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every request and answers with a fixed outcome.
    struct RecordingProvider {
        requests: Mutex<Vec<SearchRequest>>,
        fail_with: Option<u16>,
        response_id: &'static str,
    }

    impl RecordingProvider {
        fn new(fail_with: Option<u16>) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail_with,
                response_id: "resp_next",
            })
        }

        fn last_request(&self) -> SearchRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn search(&self, request: SearchRequest) -> Result<SearchResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            if let Some(status) = self.fail_with {
                return Err(ProviderError::new("recording", "upstream said no").with_status(status));
            }
            Ok(SearchResponse {
                provider: "recording".into(),
                response_id: self.response_id.into(),
                text: "answer".into(),
                usage: TokenUsage {
                    input_tokens: 40,
                    output_tokens: 2,
                    total_tokens: 42,
                },
                latency_ms: 3,
            })
        }

        async fn compact(&self, _request: CompactRequest) -> Result<CompactResponse, ProviderError> {
            Err(ProviderError::new("recording", "not supported"))
        }
    }

    #[tokio::test]
    async fn test_success_extracts_answer() {
        let provider = RecordingProvider::new(None);
        let executor = QueryExecutor::new(provider.clone(), "test-model");

        let result = executor
            .execute("what is new", &QueryOptions::default(), Some("resp_prev"))
            .await;

        assert!(result.is_success());
        assert_eq!(result.text, "answer");
        assert_eq!(result.continuation_token, "resp_next");
        assert_eq!(result.tokens_used, 42);

        let request = provider.last_request();
        assert!(request.store);
        assert_eq!(request.model, "test-model");
        assert_eq!(request.previous_response_id.as_deref(), Some("resp_prev"));
    }

    #[tokio::test]
    async fn test_empty_continuation_starts_fresh() {
        let provider = RecordingProvider::new(None);
        let executor = QueryExecutor::new(provider.clone(), "test-model");

        executor.execute("q", &QueryOptions::default(), Some("")).await;
        assert!(provider.last_request().previous_response_id.is_none());
    }

    #[tokio::test]
    async fn test_options_forwarded() {
        let provider = RecordingProvider::new(None);
        let executor = QueryExecutor::new(provider.clone(), "test-model");
        let options = QueryOptions {
            reasoning_effort: Level::High,
            search_context_size: Level::Low,
            verbosity: Level::High,
            format_directive: Some("  Use a table  ".into()),
        };

        executor.execute("q", &options, None).await;
        let request = provider.last_request();
        assert_eq!(request.reasoning_effort, Level::High);
        assert_eq!(request.search_context_size, Level::Low);
        assert_eq!(request.verbosity, Level::High);
        assert_eq!(request.instructions.as_deref(), Some("Use a table"));
    }

    #[tokio::test]
    async fn test_failure_becomes_message() {
        let provider = RecordingProvider::new(Some(429));
        let executor = QueryExecutor::new(provider, "test-model");

        let result = executor.execute("q", &QueryOptions::default(), None).await;
        assert!(!result.is_success());
        assert!(result.text.starts_with("Rate limit exceeded"));
        assert!(result.continuation_token.is_empty());
        assert_eq!(result.tokens_used, 0);
        assert!(matches!(result.failure, Some(SiftError::ProviderRateLimit(_))));
    }

    #[tokio::test]
    async fn test_blank_response_id_is_a_failure() {
        let provider = Arc::new(RecordingProvider {
            requests: Mutex::new(Vec::new()),
            fail_with: None,
            response_id: "  ",
        });
        let executor = QueryExecutor::new(provider, "test-model");

        let result = executor
            .execute("q", &QueryOptions::default(), Some("resp_prev"))
            .await;
        assert!(!result.is_success());
        assert!(result.continuation_token.is_empty());
        assert_eq!(result.tokens_used, 0);
        assert_eq!(
            result.text,
            "Search failed: provider returned an empty response id"
        );
        assert!(matches!(result.failure, Some(SiftError::ProviderUnknown(_))));
    }

    #[test]
    fn test_options_from_defaults() {
        let defaults = QueryDefaultsConfig {
            reasoning_effort: "high".into(),
            search_context_size: "LOW".into(),
            verbosity: "bogus".into(),
        };
        let options = QueryOptions::from_defaults(&defaults);
        assert_eq!(options.reasoning_effort, Level::High);
        assert_eq!(options.search_context_size, Level::Low);
        assert_eq!(options.verbosity, Level::Medium);
    }
}
