//! Relay Channels - Main entry point.

use anyhow::Result;
use relay_channels::start_server;
use relay_common::config::Config;
use relay_common::logging::init_logging;
use relay_common::validation::Validate;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", "pretty");
            tracing::error!("{e}");
            std::process::exit(e.exit_code());
        }
    };

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Relay Channels v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        std::process::exit(1);
    }
    config.log_summary();

    // Start the HTTP server
    start_server(&config).await
}
