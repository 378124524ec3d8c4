//! Configuration management for Sift.
//!
//! The gateway reads a single configuration file at `~/.sift/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (SIFT_* prefix, plus `OPENAI_*`)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SIFT_HOST` → server.host
//! - `SIFT_PORT` → server.port
//! - `SIFT_LOG_LEVEL` → observability.log_level
//! - `SIFT_MODEL` → provider.model
//! - `SIFT_SESSION_TTL_SECS` → sessions.ttl_secs
//! - `SIFT_MAX_SESSIONS` → sessions.max_sessions
//! - `SIFT_AUTO_COMPACT` → sessions.auto_compact
//! - `OPENAI_API_KEY` → provider.api_key
//! - `OPENAI_BASE_URL` → provider.base_url

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".sift"),
        |dirs| dirs.home_dir().join(".sift"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the Sift gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream search provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Session lifecycle settings (TTL, capacity, compaction)
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Default per-query options applied when a request omits them
    #[serde(default)]
    pub defaults: QueryDefaultsConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SIFT_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SIFT_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(level) = std::env::var("SIFT_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(model) = std::env::var("SIFT_MODEL") {
            self.provider.model = model;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.provider.base_url = url;
        }

        if let Ok(ttl) = std::env::var("SIFT_SESSION_TTL_SECS") {
            if let Ok(v) = ttl.parse() {
                self.sessions.ttl_secs = v;
            }
        }
        if let Ok(max) = std::env::var("SIFT_MAX_SESSIONS") {
            if let Ok(v) = max.parse() {
                self.sessions.max_sessions = v;
            }
        }
        if let Ok(flag) = std::env::var("SIFT_AUTO_COMPACT") {
            self.sessions.auto_compact = matches!(flag.as_str(), "1" | "true" | "yes" | "on");
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4480
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Upstream conversational search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (falls back to `OPENAI_API_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Automatic retries for transient failures (rate limit, timeout, 5xx)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds (doubles each retry)
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_model() -> String {
    "gpt-5".into()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    4_000
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Idle time after which a session expires
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum number of live sessions before LRU eviction kicks in
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Compact conversations automatically when a threshold is reached
    #[serde(default = "default_true")]
    pub auto_compact: bool,

    /// Compact after this many queries since the last compaction
    #[serde(default = "default_compact_query_threshold")]
    pub compact_query_threshold: u64,

    /// Compact after this many tokens since the last compaction
    #[serde(default = "default_compact_token_threshold")]
    pub compact_token_threshold: u64,

    /// Attempts per compaction before giving up
    #[serde(default = "default_compact_max_attempts")]
    pub compact_max_attempts: u32,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_sessions: default_max_sessions(),
            auto_compact: true,
            compact_query_threshold: default_compact_query_threshold(),
            compact_token_threshold: default_compact_token_threshold(),
            compact_max_attempts: default_compact_max_attempts(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_sessions() -> usize {
    100
}

fn default_compact_query_threshold() -> u64 {
    10
}

fn default_compact_token_threshold() -> u64 {
    100_000
}

fn default_compact_max_attempts() -> u32 {
    2
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Query Defaults
// ============================================================================

/// Defaults for per-query options. Values are the provider's
/// `low` / `medium` / `high` levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDefaultsConfig {
    #[serde(default = "default_level")]
    pub reasoning_effort: String,
    #[serde(default = "default_level")]
    pub search_context_size: String,
    #[serde(default = "default_level")]
    pub verbosity: String,
}

impl Default for QueryDefaultsConfig {
    fn default() -> Self {
        Self {
            reasoning_effort: default_level(),
            search_context_size: default_level(),
            verbosity: default_level(),
        }
    }
}

fn default_level() -> String {
    "medium".into()
}

fn default_true() -> bool {
    true
}
