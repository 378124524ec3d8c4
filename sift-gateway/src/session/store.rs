//! In-memory session store with idle expiry and LRU eviction.
//!
//! Expired entries are swept lazily: on `create`, and whenever a lookup or
//! mutation touches an expired id. There is no background timer.

use crate::clock::Clock;
use serde::Serialize;
use sift_common::config::SessionsConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Per-session slot that serializes requests for the same id.
pub type SessionGate = Arc<AsyncMutex<()>>;

/// One ongoing multi-turn conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    /// Provider handle for the latest turn; empty until the first successful call.
    pub continuation_token: String,
    pub created_at: u64,
    pub last_access_at: u64,
    /// Queries since the last compaction.
    pub query_count: u64,
    /// Tokens used since the last compaction.
    pub total_tokens: u64,
}

impl Session {
    pub fn has_continuation(&self) -> bool {
        !self.continuation_token.is_empty()
    }
}

/// Store limits.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Idle time after which a session is treated as absent.
    pub ttl: Duration,
    /// Upper bound on stored sessions.
    pub max_sessions: usize,
}

impl From<&SessionsConfig> for SessionStoreConfig {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.ttl_secs),
            max_sessions: config.max_sessions,
        }
    }
}

struct Entry {
    session: Session,
    gate: SessionGate,
}

/// Session id → session record.
pub struct SessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl_ms: u64,
    max_sessions: usize,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(config: SessionStoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms: config.ttl.as_millis() as u64,
            max_sessions: config.max_sessions.max(1),
            clock,
        }
    }

    // Every critical section is synchronous, so a poisoned lock still guards a consistent map.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, session: &Session, now: u64) -> bool {
        now.saturating_sub(session.last_access_at) >= self.ttl_ms
    }

    /// Allocate a new session with a fresh id and zeroed counters.
    pub fn create(&self) -> Session {
        self.create_with_gate().0
    }

    /// Like [`create`](Self::create), also returning the new session's gate.
    pub fn create_with_gate(&self) -> (Session, SessionGate) {
        let now = self.clock.now_ms();
        let mut entries = self.entries();

        self.sweep(&mut entries, now);
        while entries.len() >= self.max_sessions {
            if Self::evict_oldest(&mut entries).is_none() {
                break;
            }
        }

        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Session {
            id: id.clone(),
            continuation_token: String::new(),
            created_at: now,
            last_access_at: now,
            query_count: 0,
            total_tokens: 0,
        };
        let gate = SessionGate::default();

        entries.insert(
            id,
            Entry {
                session: session.clone(),
                gate: Arc::clone(&gate),
            },
        );

        tracing::debug!(session_id = %session.id, live = entries.len(), "Session created");
        (session, gate)
    }

    /// Look up a live session. Expired entries are removed and reported absent.
    /// Does not refresh `last_access_at`.
    pub fn get(&self, id: &str) -> Option<Session> {
        let now = self.clock.now_ms();
        let mut entries = self.entries();
        self.live_entry(&mut entries, id, now)
            .map(|entry| entry.session.clone())
    }

    /// Gate of a live session.
    pub fn gate(&self, id: &str) -> Option<SessionGate> {
        let now = self.clock.now_ms();
        let mut entries = self.entries();
        self.live_entry(&mut entries, id, now)
            .map(|entry| Arc::clone(&entry.gate))
    }

    /// Record a successful turn. No-op if the session is gone.
    pub fn update(&self, id: &str, continuation_token: &str, tokens_delta: u64) {
        let now = self.clock.now_ms();
        let mut entries = self.entries();
        if let Some(entry) = self.live_entry(&mut entries, id, now) {
            let session = &mut entry.session;
            session.continuation_token = continuation_token.to_string();
            session.last_access_at = now.max(session.created_at);
            session.query_count += 1;
            session.total_tokens = session.total_tokens.saturating_add(tokens_delta);
        }
    }

    /// Replace the continuation token without counting a turn. No-op if absent.
    pub fn set_continuation_token(&self, id: &str, continuation_token: &str) {
        let now = self.clock.now_ms();
        let mut entries = self.entries();
        if let Some(entry) = self.live_entry(&mut entries, id, now) {
            entry.session.continuation_token = continuation_token.to_string();
        }
    }

    /// Zero the usage counters. No-op if absent.
    pub fn reset_counters(&self, id: &str) {
        let now = self.clock.now_ms();
        let mut entries = self.entries();
        if let Some(entry) = self.live_entry(&mut entries, id, now) {
            entry.session.query_count = 0;
            entry.session.total_tokens = 0;
        }
    }

    /// Remove a session explicitly. Returns whether a live session was removed.
    pub fn evict(&self, id: &str) -> bool {
        let now = self.clock.now_ms();
        let mut entries = self.entries();
        match entries.remove(id) {
            Some(entry) => !self.is_expired(&entry.session, now),
            None => false,
        }
    }

    /// Drop expired sessions, then trim to capacity oldest-first.
    /// Returns the number of sessions removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries();
        self.sweep(&mut entries, now)
    }

    /// Number of stored sessions, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_entry<'a>(
        &self,
        entries: &'a mut HashMap<String, Entry>,
        id: &str,
        now: u64,
    ) -> Option<&'a mut Entry> {
        let expired = self.is_expired(&entries.get(id)?.session, now);
        if expired {
            entries.remove(id);
            tracing::debug!(session_id = %id, "Session expired");
            return None;
        }
        entries.get_mut(id)
    }

    fn sweep(&self, entries: &mut HashMap<String, Entry>, now: u64) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(&entry.session, now));
        let expired = before - entries.len();

        let mut evicted = 0;
        while entries.len() > self.max_sessions {
            if Self::evict_oldest(entries).is_none() {
                break;
            }
            evicted += 1;
        }

        if expired + evicted > 0 {
            tracing::debug!(expired, evicted, live = entries.len(), "Session cleanup");
        }
        expired + evicted
    }

    fn evict_oldest(entries: &mut HashMap<String, Entry>) -> Option<Session> {
        let oldest = entries
            .values()
            .min_by_key(|entry| (entry.session.last_access_at, entry.session.created_at))
            .map(|entry| entry.session.id.clone())?;

        let removed = entries.remove(&oldest).map(|entry| entry.session);
        tracing::debug!(session_id = %oldest, "Session evicted (least recently used)");
        removed
    }
}
