//! Sift Gateway - Main entry point.

use anyhow::Result;
use sift_common::config::Config;
use sift_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration (file + environment)
    let config = Config::load_and_validate()?;

    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("Sift Gateway v{}", env!("CARGO_PKG_VERSION"));

    sift_gateway::start_server(&config).await
}
