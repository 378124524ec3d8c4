//! Sift Common - Shared configuration, errors, and logging for the Sift gateway.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and structured logging helpers
//! - Small string utilities used when logging provider output

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, ObservabilityConfig, ProviderConfig, QueryDefaultsConfig, ServerConfig,
    SessionsConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};
