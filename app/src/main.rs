//! Showrunner service entry point.
//!
//! Configuration comes from the environment (and `.env` when present).
//! The process runs until Ctrl+C or SIGTERM, then stops every loop and
//! exits.

use anyhow::Context;
use showrunner::{Config, Pipeline, init_tracing};
use showrunner_runtime::metrics::MetricsServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing(config.telemetry.log_format);

    tracing::info!(
        source = ?config.source.kind,
        components = ?config.components.active(),
        "Starting showrunner"
    );

    if let Some(addr) = config.telemetry.metrics_addr {
        MetricsServer::new(addr)
            .start()
            .context("Failed to start metrics endpoint")?;
    }

    let mut pipeline = Pipeline::connect(config)
        .await
        .context("Failed to start pipeline")?;
    pipeline.run().context("Failed to spawn background tasks")?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    let report = pipeline.stop().await;
    if !report.timed_out.is_empty() || !report.cleanup_failures.is_empty() {
        tracing::warn!(
            timed_out = ?report.timed_out,
            cleanup_failures = ?report.cleanup_failures,
            "Shutdown finished with problems"
        );
    }
    tracing::info!(joined = report.joined.len(), "Showrunner stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
