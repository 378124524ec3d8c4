//! Stateful single-query path: session lookup, compaction, call, update.

use super::compaction::{CompactionPolicy, Compactor};
use super::store::{Session, SessionStore};
use crate::error::SiftError;
use crate::executor::{QueryExecutor, QueryOptions};
use serde::Serialize;
use sift_common::util::query_preview;
use std::sync::Arc;

/// One conversational query.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: String,
    /// Continue this session; a new one is created when omitted.
    pub session_id: Option<String>,
    pub options: QueryOptions,
}

/// Reply to a single query. A provider failure is still a reply: `text`
/// carries the user-facing message and `error_code` says what went wrong.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReply {
    pub session_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

/// Owns the session store and drives the single-query flow.
pub struct SessionManager {
    store: Arc<SessionStore>,
    policy: CompactionPolicy,
    compactor: Compactor,
    executor: Arc<QueryExecutor>,
}

impl SessionManager {
    pub fn new(
        store: Arc<SessionStore>,
        policy: CompactionPolicy,
        compactor: Compactor,
        executor: Arc<QueryExecutor>,
    ) -> Self {
        Self {
            store,
            policy,
            compactor,
            executor,
        }
    }

    /// Run a query inside a session.
    ///
    /// Requests for the same session id are serialized by the session's gate.
    pub async fn query(&self, request: SearchQuery) -> Result<SearchReply, SiftError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SiftError::InvalidInput("query must not be empty".into()));
        }

        let (session, gate) = match request.session_id.as_deref() {
            Some(id) => {
                let gate = self
                    .store
                    .gate(id)
                    .ok_or_else(|| SiftError::InvalidSession(id.to_string()))?;
                (id.to_string(), gate)
            }
            None => {
                let (session, gate) = self.store.create_with_gate();
                (session.id, gate)
            }
        };
        let _guard = gate.lock().await;

        // The session may have expired or been evicted while we waited.
        let mut current = self
            .store
            .get(&session)
            .ok_or_else(|| SiftError::InvalidSession(session.clone()))?;

        let mut warning = None;
        if self.policy.is_due(&current) {
            match self.compactor.compact(&current).await {
                Ok(token) => {
                    self.store.set_continuation_token(&current.id, &token);
                    self.store.reset_counters(&current.id);
                    current.continuation_token = token;
                }
                Err(e) => {
                    tracing::warn!(session_id = %current.id, error = %e, "Continuing without compaction");
                    warning = Some(e.to_string());
                }
            }
        }

        let result = self
            .executor
            .execute(query, &request.options, Some(&current.continuation_token))
            .await;

        if result.is_success() {
            self.store
                .update(&current.id, &result.continuation_token, result.tokens_used);
        }
        tracing::debug!(
            session_id = %current.id,
            query = %query_preview(query),
            success = result.is_success(),
            tokens = result.tokens_used,
            "Session query finished"
        );

        Ok(SearchReply {
            session_id: current.id,
            error_code: result.failure.as_ref().map(SiftError::code),
            text: result.text,
            warning,
        })
    }

    /// Snapshot of a live session.
    pub fn session(&self, id: &str) -> Result<Session, SiftError> {
        self.store
            .get(id)
            .ok_or_else(|| SiftError::InvalidSession(id.to_string()))
    }

    /// End a session explicitly.
    pub fn end_session(&self, id: &str) -> Result<(), SiftError> {
        if self.store.evict(id) {
            tracing::debug!(session_id = %id, "Session ended");
            Ok(())
        } else {
            Err(SiftError::InvalidSession(id.to_string()))
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::provider::{
        CompactRequest, CompactResponse, Provider, ProviderError, RetryPolicy, SearchRequest,
        SearchResponse, TokenUsage,
    };
    use crate::session::store::SessionStoreConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Numbers its responses and records the continuation each search continued.
    #[derive(Default)]
    struct MockProvider {
        searches: AtomicUsize,
        compactions: AtomicUsize,
        in_flight: AtomicUsize,
        overlapped: AtomicBool,
        fail_search: AtomicBool,
        fail_compact: AtomicBool,
        blank_response_id: AtomicBool,
        search_delay_ms: u64,
        continued_from: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn search(&self, request: SearchRequest) -> Result<SearchResponse, ProviderError> {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            if self.search_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.search_delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.continued_from
                .lock()
                .unwrap()
                .push(request.previous_response_id.clone());
            let n = self.searches.fetch_add(1, Ordering::SeqCst) + 1;

            if self.fail_search.load(Ordering::SeqCst) {
                return Err(ProviderError::new("mock", "upstream exploded").with_status(500));
            }
            let response_id = if self.blank_response_id.load(Ordering::SeqCst) {
                String::new()
            } else {
                format!("resp_{n}")
            };
            Ok(SearchResponse {
                provider: "mock".into(),
                response_id,
                text: format!("answer to {}", request.input),
                usage: TokenUsage {
                    input_tokens: 90,
                    output_tokens: 10,
                    total_tokens: 100,
                },
                latency_ms: 1,
            })
        }

        async fn compact(&self, _request: CompactRequest) -> Result<CompactResponse, ProviderError> {
            let n = self.compactions.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_compact.load(Ordering::SeqCst) {
                return Err(ProviderError::new("mock", "compaction unavailable").with_status(503));
            }
            Ok(CompactResponse {
                response_id: format!("compacted_{n}"),
            })
        }
    }

    fn manager(provider: Arc<MockProvider>, query_threshold: u64) -> SessionManager {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(SessionStore::new(
            SessionStoreConfig {
                ttl: Duration::from_secs(60),
                max_sessions: 10,
            },
            clock,
        ));
        let policy = CompactionPolicy {
            enabled: true,
            query_threshold,
            token_threshold: 1_000_000,
        };
        let compactor = Compactor::new(provider.clone(), "test-model", RetryPolicy::fixed(2));
        let executor = Arc::new(QueryExecutor::new(provider, "test-model"));
        SessionManager::new(store, policy, compactor, executor)
    }

    fn query(text: &str, session_id: Option<&str>) -> SearchQuery {
        SearchQuery {
            query: text.into(),
            session_id: session_id.map(String::from),
            options: QueryOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_new_session_created_on_demand() {
        let provider = Arc::new(MockProvider::default());
        let manager = manager(provider, 10);

        let reply = manager.query(query("first", None)).await.unwrap();
        assert_eq!(reply.text, "answer to first");
        assert!(reply.warning.is_none());
        assert!(reply.error_code.is_none());

        let session = manager.session(&reply.session_id).unwrap();
        assert_eq!(session.continuation_token, "resp_1");
        assert_eq!(session.query_count, 1);
        assert_eq!(session.total_tokens, 100);
    }

    #[tokio::test]
    async fn test_follow_up_continues_conversation() {
        let provider = Arc::new(MockProvider::default());
        let manager = manager(provider.clone(), 10);

        let first = manager.query(query("first", None)).await.unwrap();
        manager
            .query(query("second", Some(&first.session_id)))
            .await
            .unwrap();

        let continued = provider.continued_from.lock().unwrap().clone();
        assert_eq!(continued, vec![None, Some("resp_1".to_string())]);
        assert_eq!(manager.session(&first.session_id).unwrap().query_count, 2);
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() {
        let provider = Arc::new(MockProvider::default());
        let manager = manager(provider.clone(), 10);

        let err = manager
            .query(query("hello", Some("nonexistent-id")))
            .await
            .unwrap_err();
        assert!(matches!(err, SiftError::InvalidSession(_)));
        assert!(manager.store().is_empty());
        assert_eq!(provider.searches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let provider = Arc::new(MockProvider::default());
        let manager = manager(provider, 10);

        let err = manager.query(query("   ", None)).await.unwrap_err();
        assert!(matches!(err, SiftError::InvalidInput(_)));
        assert!(manager.store().is_empty());
    }

    #[tokio::test]
    async fn test_compaction_before_third_query() {
        let provider = Arc::new(MockProvider::default());
        let manager = manager(provider.clone(), 2);

        let first = manager.query(query("one", None)).await.unwrap();
        let id = first.session_id;
        manager.query(query("two", Some(&id))).await.unwrap();
        assert_eq!(provider.compactions.load(Ordering::SeqCst), 0);

        let third = manager.query(query("three", Some(&id))).await.unwrap();
        assert!(third.warning.is_none());
        assert_eq!(provider.compactions.load(Ordering::SeqCst), 1);

        let continued = provider.continued_from.lock().unwrap().clone();
        assert_eq!(continued[2].as_deref(), Some("compacted_1"));

        let session = manager.session(&id).unwrap();
        assert_eq!(session.query_count, 1);
        assert_eq!(session.total_tokens, 100);
        assert_eq!(session.continuation_token, "resp_3");
    }

    #[tokio::test]
    async fn test_compaction_failure_is_a_warning() {
        let provider = Arc::new(MockProvider::default());
        provider.fail_compact.store(true, Ordering::SeqCst);
        let manager = manager(provider.clone(), 1);

        let first = manager.query(query("one", None)).await.unwrap();
        let before = manager.session(&first.session_id).unwrap();

        let second = manager
            .query(query("two", Some(&first.session_id)))
            .await
            .unwrap();
        assert_eq!(provider.compactions.load(Ordering::SeqCst), 2);
        assert!(second.warning.unwrap().contains("Compaction failed after 2 attempt(s)"));
        assert_eq!(second.text, "answer to two");

        // The stale token was used and counters kept growing.
        let continued = provider.continued_from.lock().unwrap().clone();
        assert_eq!(continued[1].as_deref(), Some(before.continuation_token.as_str()));
        assert_eq!(manager.session(&first.session_id).unwrap().query_count, 2);
    }

    #[tokio::test]
    async fn test_failed_call_leaves_session_untouched() {
        let provider = Arc::new(MockProvider::default());
        let manager = manager(provider.clone(), 10);

        let first = manager.query(query("one", None)).await.unwrap();
        let before = manager.session(&first.session_id).unwrap();

        provider.fail_search.store(true, Ordering::SeqCst);
        let reply = manager
            .query(query("two", Some(&first.session_id)))
            .await
            .unwrap();

        assert_eq!(reply.error_code, Some("provider_error"));
        assert!(reply.text.starts_with("Search failed"));
        assert_eq!(manager.session(&first.session_id).unwrap(), before);
    }

    #[tokio::test]
    async fn test_blank_response_id_keeps_continuity() {
        let provider = Arc::new(MockProvider::default());
        let manager = manager(provider.clone(), 10);

        let first = manager.query(query("one", None)).await.unwrap();
        let before = manager.session(&first.session_id).unwrap();

        provider.blank_response_id.store(true, Ordering::SeqCst);
        let reply = manager
            .query(query("two", Some(&first.session_id)))
            .await
            .unwrap();
        assert_eq!(reply.error_code, Some("provider_error"));
        assert_eq!(manager.session(&first.session_id).unwrap(), before);

        // The next turn still continues the last good response.
        provider.blank_response_id.store(false, Ordering::SeqCst);
        manager
            .query(query("three", Some(&first.session_id)))
            .await
            .unwrap();
        let continued = provider.continued_from.lock().unwrap().clone();
        assert_eq!(continued[2].as_deref(), Some("resp_1"));
    }

    #[tokio::test]
    async fn test_exhausted_compaction_and_failed_call_change_nothing() {
        let provider = Arc::new(MockProvider::default());
        let manager = manager(provider.clone(), 1);

        let first = manager.query(query("one", None)).await.unwrap();
        let before = manager.session(&first.session_id).unwrap();

        provider.fail_compact.store(true, Ordering::SeqCst);
        provider.fail_search.store(true, Ordering::SeqCst);
        let reply = manager
            .query(query("two", Some(&first.session_id)))
            .await
            .unwrap();

        assert_eq!(provider.compactions.load(Ordering::SeqCst), 2);
        assert!(reply.warning.is_some());
        assert_eq!(reply.error_code, Some("provider_error"));
        assert_eq!(manager.session(&first.session_id).unwrap(), before);
    }

    #[tokio::test]
    async fn test_same_session_requests_are_serialized() {
        let provider = Arc::new(MockProvider {
            search_delay_ms: 20,
            ..MockProvider::default()
        });
        let manager = Arc::new(manager(provider.clone(), 10));

        let first = manager.query(query("one", None)).await.unwrap();
        let id = first.session_id;

        let a = tokio::spawn({
            let manager = Arc::clone(&manager);
            let id = id.clone();
            async move { manager.query(query("two", Some(&id))).await }
        });
        let b = tokio::spawn({
            let manager = Arc::clone(&manager);
            let id = id.clone();
            async move { manager.query(query("three", Some(&id))).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert!(!provider.overlapped.load(Ordering::SeqCst));
        let session = manager.session(&id).unwrap();
        assert_eq!(session.query_count, 3);

        // Each follow-up continued the turn before it.
        let continued = provider.continued_from.lock().unwrap().clone();
        assert_eq!(continued[1].as_deref(), Some("resp_1"));
        assert_eq!(continued[2].as_deref(), Some("resp_2"));
    }

    #[tokio::test]
    async fn test_end_session() {
        let provider = Arc::new(MockProvider::default());
        let manager = manager(provider, 10);

        let reply = manager.query(query("one", None)).await.unwrap();
        manager.end_session(&reply.session_id).unwrap();
        assert!(matches!(
            manager.session(&reply.session_id),
            Err(SiftError::InvalidSession(_))
        ));
        assert!(manager.end_session(&reply.session_id).is_err());
    }
}
