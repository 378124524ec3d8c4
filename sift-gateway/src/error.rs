//! Request-level error taxonomy for the gateway.

use crate::provider::{FailureKind, ProviderError};
use sift_common::util::{clip, redact_secrets};
use thiserror::Error;

/// Longest upstream message echoed back to callers.
const MAX_UPSTREAM_MESSAGE_CHARS: usize = 300;

/// Errors surfaced by the session and batch layers.
#[derive(Debug, Clone, Error)]
pub enum SiftError {
    /// Unknown or expired session id. Terminal; no session is created in its place.
    #[error("Invalid or expired session: {0}")]
    InvalidSession(String),

    /// Malformed request (empty query, batch size out of range).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Authentication with the search provider failed: {0}")]
    ProviderAuth(String),

    #[error("Search provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Search provider timed out: {0}")]
    ProviderTimeout(String),

    #[error("Search provider error: {0}")]
    ProviderUnknown(String),

    /// Every compaction attempt failed. Only ever reported as a warning.
    #[error("Compaction failed after {attempts} attempt(s): {last_error}")]
    CompactionExhausted { attempts: u32, last_error: String },
}

impl SiftError {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidSession(_) => "invalid_session",
            Self::InvalidInput(_) => "invalid_input",
            Self::ProviderAuth(_) => "provider_auth",
            Self::ProviderRateLimit(_) => "provider_rate_limit",
            Self::ProviderTimeout(_) => "provider_timeout",
            Self::ProviderUnknown(_) => "provider_error",
            Self::CompactionExhausted { .. } => "compaction_exhausted",
        }
    }

    /// HTTP status for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidSession(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::ProviderAuth(_) => 401,
            Self::ProviderRateLimit(_) => 429,
            Self::ProviderTimeout(_) => 504,
            Self::ProviderUnknown(_) | Self::CompactionExhausted { .. } => 502,
        }
    }

    /// Text shown to the caller in place of an answer.
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderAuth(_) => {
                "Authentication failed: the search provider rejected the API key. Check the provider configuration.".into()
            }
            Self::ProviderRateLimit(_) => {
                "Rate limit exceeded: the search provider is throttling requests. Try again shortly.".into()
            }
            Self::ProviderTimeout(_) => {
                "The search request timed out before the provider responded. Try again or lower the reasoning effort.".into()
            }
            Self::ProviderUnknown(detail) => format!("Search failed: {detail}"),
            other => other.to_string(),
        }
    }
}

impl From<&ProviderError> for SiftError {
    fn from(err: &ProviderError) -> Self {
        let detail = clip(&redact_secrets(&err.message), MAX_UPSTREAM_MESSAGE_CHARS);
        match err.kind() {
            FailureKind::Authentication => Self::ProviderAuth(detail),
            FailureKind::RateLimit => Self::ProviderRateLimit(detail),
            FailureKind::Timeout => Self::ProviderTimeout(detail),
            FailureKind::Unknown => Self::ProviderUnknown(detail),
        }
    }
}
