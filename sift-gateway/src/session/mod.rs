//! Conversational sessions.
//!
//! - [`SessionStore`]: id → session map with idle expiry and LRU eviction
//! - [`CompactionPolicy`] / [`Compactor`]: keep provider-side context bounded
//! - [`SessionManager`]: the single-query flow tying them together

mod compaction;
mod service;
mod store;

pub use compaction::{CompactionPolicy, Compactor};
pub use service::{SearchQuery, SearchReply, SessionManager};
pub use store::{Session, SessionGate, SessionStore, SessionStoreConfig};
