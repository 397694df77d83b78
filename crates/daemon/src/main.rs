//! ffgate - Main Entry Point
//! Admission gates + transcode pool, reporting until Ctrl+C

use anyhow::{Context, Result};
use ffgate_daemon::app::check_executors;
use ffgate_daemon::{logging, App, Settings};
use std::time::Duration;
use tracing::{info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on draining the pool at exit (grace window plus reaping)
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let settings = Settings::from_env().context("Failed to load configuration")?;

    // 2. Initialize logging; the guard flushes file output on exit
    let _log_guard = logging::init(&settings.log)?;
    info!("ffgate v{} starting...", VERSION);

    // 3. Executor presence (warning only)
    check_executors(&settings);

    // 4. Wire components
    let app = App::build(&settings)?;
    let background = app.spawn_background();

    info!(
        status_interval_secs = settings.status_interval.as_secs(),
        "System ready. Press Ctrl+C to shutdown"
    );

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 6. Graceful shutdown
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, app.shutdown())
        .await
        .is_err()
    {
        warn!("Transcode pool did not drain in time");
    }
    let _ = tokio::time::timeout(Duration::from_secs(1), background).await;

    info!("Shutdown complete.");
    Ok(())
}
