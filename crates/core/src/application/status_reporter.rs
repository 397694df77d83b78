// Status Reporter
// Periodic structured snapshot of every admission gate and the transcode pool

use crate::application::aggregator::{AggregateStatus, QueueAggregator};
use crate::application::shutdown::ShutdownToken;
use crate::application::transcode_pool::{PoolStatus, TranscodePool};
use crate::domain::Health;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Everything a poller needs in one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub queues: AggregateStatus,
    pub pool: PoolStatus,
}

/// Status reporter
///
/// Logs a system snapshot every `interval`; escalates to `warn!` while any
/// gate is critical.
pub struct StatusReporter {
    aggregator: Arc<QueueAggregator>,
    pool: TranscodePool,
    interval: Duration,
}

impl StatusReporter {
    /// Create a new status reporter
    ///
    /// # Arguments
    /// * `aggregator` - Gates to report on
    /// * `pool` - Transcode pool to report on
    /// * `interval` - How often to log a snapshot
    pub fn new(aggregator: Arc<QueueAggregator>, pool: TranscodePool, interval: Duration) -> Self {
        Self {
            aggregator,
            pool,
            interval,
        }
    }

    pub fn snapshot(&self) -> SystemStatus {
        SystemStatus {
            queues: self.aggregator.status(),
            pool: self.pool.status(),
        }
    }

    /// Log one snapshot and return it
    pub fn report_once(&self) -> SystemStatus {
        let snapshot = self.snapshot();
        let rendered = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize status snapshot");
                String::new()
            }
        };

        if snapshot.queues.overall_health == Health::Critical {
            warn!(
                health = %snapshot.queues.overall_health,
                active = snapshot.queues.active,
                queued = snapshot.queues.queued,
                pool_active = snapshot.pool.active,
                pool_queued = snapshot.pool.queued,
                status = %rendered,
                "Admission queues critical"
            );
        } else {
            info!(
                health = %snapshot.queues.overall_health,
                active = snapshot.queues.active,
                queued = snapshot.queues.queued,
                pool_active = snapshot.pool.active,
                pool_queued = snapshot.pool.queued,
                status = %rendered,
                "System status"
            );
        }
        snapshot
    }

    /// Run reporting loop until shutdown (spawn with tokio::spawn)
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Status reporter started"
        );

        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.report_once();
                }
                _ = shutdown.wait() => {
                    info!("Status reporter stopped");
                    break;
                }
            }
        }
    }
}
