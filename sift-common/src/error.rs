//! Error types shared by Sift crates.
//!
//! Request-level failures (bad session, provider errors) live in the gateway.
//! This enum covers the infrastructure around them: configuration and
//! document encoding.

use crate::validation::ValidationError;
use thiserror::Error;

/// Result type alias using the Sift error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration parsed but holds values the gateway cannot run with.
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// Encoding a document for a caller failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status when this error ends a request.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) | Self::Validation(_) => 503,
            Self::Json(_) => 500,
        }
    }
}
