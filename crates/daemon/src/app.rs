// Composition root: build gates, pool, probe and services from Settings

use crate::config::Settings;
use anyhow::{Context, Result};
use ffgate_core::application::{
    shutdown_channel, ConversionService, QueueAggregator, ShutdownSender, StatusReporter,
    TranscodePool,
};
use ffgate_core::port::{MediaProbe, TranscodeLauncher};
use ffgate_infra_system::{FfprobeProbe, ProcessLauncher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wired application
pub struct App {
    aggregator: Arc<QueueAggregator>,
    pool: TranscodePool,
    conversion: Arc<ConversionService>,
    status_interval: Duration,
    shutdown: ShutdownSender,
}

impl App {
    /// Build every component with the real OS adapters
    pub fn build(settings: &Settings) -> Result<Self> {
        let launcher: Arc<dyn TranscodeLauncher> = Arc::new(
            ProcessLauncher::new(settings.ffmpeg_command())
                .with_diagnostic_tail_chars(settings.pool.diagnostic_tail_chars),
        );
        let probe: Arc<dyn MediaProbe> = Arc::new(FfprobeProbe::new(settings.ffprobe_command()));
        Self::with_adapters(settings, launcher, probe)
    }

    /// Build with caller-provided adapters
    pub fn with_adapters(
        settings: &Settings,
        launcher: Arc<dyn TranscodeLauncher>,
        probe: Arc<dyn MediaProbe>,
    ) -> Result<Self> {
        let aggregator = QueueAggregator::standard(&settings.queues)
            .context("Failed to create admission gates")?;
        let aggregator = Arc::new(aggregator);
        let pool = TranscodePool::new(settings.pool.clone(), launcher)
            .context("Failed to create transcode pool")?;
        let conversion = Arc::new(ConversionService::new(
            Arc::clone(&aggregator),
            pool.clone(),
            probe,
        ));
        let (shutdown, _token) = shutdown_channel();

        info!(
            gates = aggregator.gates().len(),
            pool_concurrency = settings.pool.max_concurrent,
            "Application wired"
        );

        Ok(Self {
            aggregator,
            pool,
            conversion,
            status_interval: settings.status_interval,
            shutdown,
        })
    }

    pub fn aggregator(&self) -> &Arc<QueueAggregator> {
        &self.aggregator
    }

    pub fn pool(&self) -> &TranscodePool {
        &self.pool
    }

    pub fn conversion(&self) -> &Arc<ConversionService> {
        &self.conversion
    }

    pub fn status_reporter(&self) -> StatusReporter {
        StatusReporter::new(
            Arc::clone(&self.aggregator),
            self.pool.clone(),
            self.status_interval,
        )
    }

    /// Start background loops; they stop on `shutdown()`
    pub fn spawn_background(&self) -> JoinHandle<()> {
        tokio::spawn(self.status_reporter().run(self.shutdown.subscribe()))
    }

    /// Stop background loops and drain the transcode pool
    pub async fn shutdown(&self) {
        self.shutdown.shutdown();
        self.pool.shutdown().await;
    }
}

/// Log whether the configured executors can be found. Never fatal.
///
/// Returns true when every executor resolved.
pub fn check_executors(settings: &Settings) -> bool {
    let command = settings.ffmpeg_command();
    let mut executors = vec![("ffmpeg", settings.ffmpeg_path.as_path())];
    if settings.ffmpeg_wrapper.is_some() {
        executors.push(("wrapper", command.program()));
    }
    executors.push(("ffprobe", settings.ffprobe_path.as_path()));

    executors
        .into_iter()
        .map(|(role, program)| resolve(role, program))
        .fold(true, |all, found| all && found)
}

fn resolve(role: &str, program: &Path) -> bool {
    match which::which(program) {
        Ok(resolved) => {
            info!(role = %role, path = %resolved.display(), "Executor found");
            true
        }
        Err(e) => {
            warn!(
                role = %role,
                program = %program.display(),
                error = %e,
                "Executor not found; jobs will fail with ExecutorUnavailable"
            );
            false
        }
    }
}
