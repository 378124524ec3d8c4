//! Conversational search provider abstraction.
//!
//! The gateway never reasons about queries itself; it forwards them to a
//! provider that runs web search and keeps server-side conversation state
//! addressed by a response id (the continuation token).

mod openai;
mod resilient;

pub use openai::OpenAIProvider;
pub use resilient::{RetryPolicy, RetryingProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for conversational search providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Run one search turn. When `previous_response_id` is set the provider
    /// continues that conversation.
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, ProviderError>;

    /// Fold the conversation ending at `previous_response_id` into a new,
    /// smaller continuation handle.
    async fn compact(&self, request: CompactRequest) -> Result<CompactResponse, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Classify this error by status code first, then by message content.
    pub fn kind(&self) -> FailureKind {
        match self.status_code {
            Some(401 | 403) => return FailureKind::Authentication,
            Some(429) => return FailureKind::RateLimit,
            Some(408 | 504) => return FailureKind::Timeout,
            _ => {}
        }

        let message = self.message.to_lowercase();
        if message.contains("api key")
            || message.contains("unauthorized")
            || message.contains("authentication")
        {
            FailureKind::Authentication
        } else if message.contains("rate limit") || message.contains("too many requests") {
            FailureKind::RateLimit
        } else if message.contains("timed out") || message.contains("timeout") {
            FailureKind::Timeout
        } else {
            FailureKind::Unknown
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self.kind() {
            FailureKind::RateLimit | FailureKind::Timeout => true,
            FailureKind::Authentication => false,
            FailureKind::Unknown => self.status_code.map_or(true, |s| s >= 500),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "[{}:{}] {}", self.provider, status, self.message),
            None => write!(f, "[{}] {}", self.provider, self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Failure classes of an upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    RateLimit,
    Timeout,
    Unknown,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Three-step knob used for reasoning effort, search breadth and verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

impl Level {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

/// One search turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Model to use
    pub model: String,
    /// Query text
    pub input: String,
    /// How much web context the search tool gathers
    pub search_context_size: Level,
    /// Reasoning depth
    pub reasoning_effort: Level,
    /// Answer length
    pub verbosity: Level,
    /// Formatting instructions for the answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Ask the provider to persist the turn so it returns a continuation id
    pub store: bool,
    /// Continuation id of the previous turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

/// Result of a search turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Provider name
    pub provider: String,
    /// Continuation id for the next turn
    pub response_id: String,
    /// Answer text
    pub text: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Compaction request; only the handle of the conversation is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactRequest {
    pub model: String,
    pub previous_response_id: String,
}

/// Compaction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactResponse {
    /// Continuation id that replaces the compacted conversation
    pub response_id: String,
}
