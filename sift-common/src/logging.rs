//! Logging setup for Sift.
//!
//! Everything logs through `tracing` with structured fields (`session_id`,
//! `attempt`, `tokens`, `latency_ms`). The subscriber renders either JSON
//! lines for collectors or compact human-readable text.
//!
//! HTTP stack internals (hyper, reqwest, rustls, ...) are held at `warn` so
//! upstream connection chatter does not drown out session logs. `RUST_LOG`
//! replaces the computed filter entirely.

use std::str::FromStr;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Targets capped at `warn` regardless of the configured level.
pub const QUIET_TARGETS: &[&str] = &[
    "hyper",
    "hyper_util",
    "h2",
    "reqwest",
    "rustls",
    "tower_http",
    "axum::rejection",
];

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Filter directives for `level` with the quiet targets appended.
fn filter_directives(level: &str) -> String {
    QUIET_TARGETS
        .iter()
        .fold(level.trim().to_ascii_lowercase(), |mut acc, target| {
            acc.push_str(&format!(",{target}=warn"));
            acc
        })
}

/// Install the global subscriber.
///
/// Unknown formats fall back to pretty output. A second call is a no-op.
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(log_level)));
    let format: LogFormat = log_format.parse().unwrap_or_default();
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false),
            )
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(level = %log_level, ?format, "Logging initialized");
    }
}

/// Fresh id correlating the log lines of one inbound request.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Create a span for an inbound request, tagged with a trace id and any extra fields.
///
/// ```ignore
/// let span = request_span!("search", trace_id, session_id = %id);
/// async { /* ... */ }.instrument(span).await;
/// ```
#[macro_export]
macro_rules! request_span {
    ($name:expr, $trace_id:expr) => {
        tracing::info_span!($name, trace_id = %$trace_id)
    };
    ($name:expr, $trace_id:expr, $($field:tt)*) => {
        tracing::info_span!($name, trace_id = %$trace_id, $($field)*)
    };
}
