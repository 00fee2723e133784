//! `telemetry-agent` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`AgentConfig`] from environment variables.
//! 2. Initialise structured logging.
//! 3. Start the [`TelemetryAgent`]: exporter selection, resource detection,
//!    trace and metrics pipelines.
//! 4. Build the Axum router and serve until Ctrl-C.
//! 5. Flush and shut down the telemetry providers.

use anyhow::{Context, Result};
use tracing::info;

use telemetry_agent::server::{self, state::AppState};
use telemetry_agent::{telemetry, AgentConfig, TelemetryAgent};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = AgentConfig::from_env().map_err(|e| {
        // Logging is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Logging
    // -----------------------------------------------------------------------
    telemetry::init_logging(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "telemetry-agent starting"
    );

    // -----------------------------------------------------------------------
    // 3. Telemetry agent
    // -----------------------------------------------------------------------
    let agent = TelemetryAgent::start(&cfg)
        .await
        .context("failed to start telemetry agent")?;

    // -----------------------------------------------------------------------
    // 4. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::from_agent(&agent);
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // -----------------------------------------------------------------------
    // 5. Shutdown
    // -----------------------------------------------------------------------
    agent.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
