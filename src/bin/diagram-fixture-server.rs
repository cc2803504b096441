//! diagram-fixture-server: reference MCP service over stdio
//!
//! Serves `generate_diagram`, `save_diagram` and `convert_to_png`. Settings
//! come from `DIAGRAM_API_KEY`, `DIAGRAM_DEV_MODE`, `DIAGRAM_TEMP_DIR` and
//! `DIAGRAM_LOG_LEVEL`. stdout carries protocol messages only; logs go to
//! stderr.

use std::process::ExitCode;

use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_contract_verifier::config::ENV_LOG_LEVEL;
use mcp_contract_verifier::fixture::FixtureOptions;

/// Reads the log level from the environment, defaulting to warn.
fn get_log_level() -> Level {
    let configured = std::env::var(ENV_LOG_LEVEL).unwrap_or_default();
    match configured.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the diagram fixture server.
fn main() -> ExitCode {
    init_tracing(get_log_level());

    let options = FixtureOptions::from_env();
    let mut server = match options.build() {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to initialise diagram fixture");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Diagram fixture server ready, waiting for client connection..."
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server.run()) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
