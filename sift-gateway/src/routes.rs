//! Route definitions for Sift Gateway.
//!
//! Provides HTTP endpoints for single and batch search, session inspection
//! and health checks.

use crate::batch::{BatchCoordinator, BatchOutcome};
use crate::error::SiftError;
use crate::executor::QueryOptions;
use crate::provider::Level;
use crate::render::{render_batch, OutputShape};
use crate::session::{SearchQuery, SearchReply, Session, SessionManager};
use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use sift_common::logging::generate_trace_id;
use sift_common::request_span;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::Instrument;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub batch: Arc<BatchCoordinator>,
    /// Applied to any option a request leaves out.
    pub defaults: QueryOptions,
}

impl AppState {
    pub fn new(sessions: SessionManager, batch: BatchCoordinator, defaults: QueryOptions) -> Self {
        Self {
            sessions: Arc::new(sessions),
            batch: Arc::new(batch),
            defaults,
        }
    }
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: SiftError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().into(),
        }),
    )
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Query options as sent by callers; anything omitted comes from the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionOverrides {
    #[serde(default)]
    pub reasoning_effort: Option<Level>,
    #[serde(default)]
    pub search_context_size: Option<Level>,
    #[serde(default)]
    pub verbosity: Option<Level>,
    #[serde(default)]
    pub format_directive: Option<String>,
}

impl OptionOverrides {
    fn resolve(self, defaults: &QueryOptions) -> QueryOptions {
        QueryOptions {
            reasoning_effort: self.reasoning_effort.unwrap_or(defaults.reasoning_effort),
            search_context_size: self
                .search_context_size
                .unwrap_or(defaults.search_context_size),
            verbosity: self.verbosity.unwrap_or(defaults.verbosity),
            format_directive: self
                .format_directive
                .or_else(|| defaults.format_directive.clone()),
        }
    }
}

/// Single search request body.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub options: OptionOverrides,
}

/// Batch search request body.
#[derive(Debug, Deserialize)]
pub struct BatchBody {
    pub queries: Vec<String>,
    #[serde(default)]
    pub output: OutputShape,
    #[serde(flatten)]
    pub options: OptionOverrides,
}

/// Batch search response.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub outcomes: Vec<BatchOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub output: OutputShape,
    /// The report rendered in the requested shape.
    pub document: String,
}

/// Build the gateway router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/search", post(search_handler))
        .route("/api/v1/search/batch", post(batch_handler))
        .route(
            "/api/v1/sessions/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Search Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn search_handler(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchReply>, ApiError> {
    let trace_id = generate_trace_id();
    let span = request_span!(
        "search",
        trace_id,
        session_id = body.session_id.as_deref().unwrap_or("new")
    );

    let query = SearchQuery {
        query: body.query,
        session_id: body.session_id,
        options: body.options.resolve(&state.defaults),
    };

    async move {
        let reply = state.sessions.query(query).await.map_err(|e| {
            tracing::info!(code = e.code(), "Search rejected");
            api_error(e)
        })?;
        tracing::info!(
            session_id = %reply.session_id,
            failed = reply.error_code.is_some(),
            compaction_warning = reply.warning.is_some(),
            "Search handled"
        );
        Ok::<_, ApiError>(Json(reply))
    }
    .instrument(span)
    .await
}

async fn batch_handler(
    State(state): State<AppState>,
    Json(body): Json<BatchBody>,
) -> Result<Json<BatchResponse>, ApiError> {
    let trace_id = generate_trace_id();
    let span = request_span!("batch", trace_id, queries = body.queries.len());
    let options = body.options.resolve(&state.defaults);
    let output = body.output;

    async move {
        let report = state
            .batch
            .run(&body.queries, &options)
            .await
            .map_err(api_error)?;

        let document = render_batch(&report, output).map_err(|e| {
            tracing::error!(error = %e, "Failed to render batch report");
            (
                StatusCode::from_u16(e.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                Json(ErrorResponse {
                    error: e.to_string(),
                    code: "render_failed".into(),
                }),
            )
        })?;

        Ok::<_, ApiError>(Json(BatchResponse {
            outcomes: report.outcomes,
            succeeded: report.succeeded,
            failed: report.failed,
            elapsed_ms: report.elapsed_ms,
            output,
            document,
        }))
    }
    .instrument(span)
    .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state.sessions.session(&id).map(Json).map_err(api_error)
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .end_session(&id)
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(api_error)
}

// ─────────────────────────────────────────────────────────────────────────────
// Health Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Health check handler.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "sift-gateway".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_fall_back_to_defaults() {
        let defaults = QueryOptions {
            reasoning_effort: Level::High,
            search_context_size: Level::Low,
            verbosity: Level::Medium,
            format_directive: Some("Be brief".into()),
        };
        let body: SearchBody =
            serde_json::from_str(r#"{"query": "q", "verbosity": "high"}"#).unwrap();
        let options = body.options.resolve(&defaults);

        assert_eq!(options.reasoning_effort, Level::High);
        assert_eq!(options.search_context_size, Level::Low);
        assert_eq!(options.verbosity, Level::High);
        assert_eq!(options.format_directive.as_deref(), Some("Be brief"));
    }

    #[test]
    fn test_batch_body_defaults_to_structured() {
        let body: BatchBody = serde_json::from_str(r#"{"queries": ["a", "b"]}"#).unwrap();
        assert_eq!(body.output, OutputShape::Structured);
        assert_eq!(body.queries.len(), 2);
    }

    #[test]
    fn test_api_error_mapping() {
        let (status, Json(body)) = api_error(SiftError::InvalidSession("abc".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "invalid_session");
        assert_eq!(body.error, "Invalid or expired session: abc");
    }
}
