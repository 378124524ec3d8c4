//! Sift Gateway - conversational web search with server-side sessions.
//!
//! This crate provides the search gateway for Sift:
//! - Multi-turn sessions backed by provider continuation tokens
//! - Automatic compaction of long conversations
//! - Stateless parallel batch queries
//!
//! ## Architecture
//!
//! ```text
//! Client → Gateway (session lookup → compaction check → search) → Provider
//!                         ↓
//!                   Session update
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod batch;
pub mod clock;
pub mod error;
pub mod executor;
pub mod provider;
pub mod render;
pub mod routes;
pub mod session;

pub use batch::{BatchCoordinator, BatchOutcome, BatchReport, MAX_BATCH_QUERIES};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SiftError;
pub use executor::{QueryExecutor, QueryOptions, QueryResult};
pub use provider::{
    OpenAIProvider, Provider, ProviderError, RetryPolicy, RetryingProvider,
};
pub use render::{render_batch, OutputShape};
pub use routes::{build_router, AppState};
pub use session::{
    CompactionPolicy, Compactor, SearchQuery, SearchReply, Session, SessionManager, SessionStore,
    SessionStoreConfig,
};

use sift_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Wire the gateway from configuration around the given provider.
pub fn build_state_with_provider(
    config: &Config,
    provider: Arc<dyn Provider>,
    clock: Arc<dyn Clock>,
) -> AppState {
    let sessions_config = &config.sessions;
    let model = config.provider.model.clone();

    let store = Arc::new(SessionStore::new(
        SessionStoreConfig::from(sessions_config),
        clock,
    ));
    let compactor = Compactor::new(
        Arc::clone(&provider),
        model.clone(),
        RetryPolicy::fixed(sessions_config.compact_max_attempts),
    );
    let executor = Arc::new(QueryExecutor::new(provider, model));

    let sessions = SessionManager::new(
        store,
        CompactionPolicy::from(sessions_config),
        compactor,
        Arc::clone(&executor),
    );

    AppState::new(
        sessions,
        BatchCoordinator::new(executor),
        QueryOptions::from_defaults(&config.defaults),
    )
}

/// Wire the gateway against the OpenAI Responses API.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let api_key = config
        .provider
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            sift_common::Error::Config(
                "no provider API key (set OPENAI_API_KEY or provider.api_key)".into(),
            )
        })?;

    let openai = OpenAIProvider::with_base_url(
        api_key,
        config.provider.base_url.clone(),
        Duration::from_secs(config.provider.timeout_secs),
    );
    let provider: Arc<dyn Provider> = Arc::new(RetryingProvider::new(
        Arc::new(openai),
        RetryPolicy::from(&config.provider),
    ));

    Ok(build_state_with_provider(
        config,
        provider,
        Arc::new(SystemClock::new()),
    ))
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let router = build_router(build_state(config)?);

    tracing::info!(
        model = %config.provider.model,
        ttl_secs = config.sessions.ttl_secs,
        max_sessions = config.sessions.max_sessions,
        auto_compact = config.sessions.auto_compact,
        "Starting Sift Gateway on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Sift Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
