// Queue Domain Model
//
// Immutable per-queue configuration plus the read-only snapshot types the
// admission gates report through.

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Queue identifier
pub type QueueId = String;

/// Stock queue names wired up by `QueueSettings`
pub const PROCESSING_QUEUE: &str = "processing";
pub const DOWNLOAD_QUEUE: &str = "download";
pub const IMAGE_QUEUE: &str = "image";

/// Fullness ratio at or above which a queue is critical
pub const DEFAULT_CRITICAL_RATIO: f64 = 0.9;

/// Fullness ratio at or above which a queue is degraded
pub const DEFAULT_DEGRADED_RATIO: f64 = 0.5;

const DEFAULT_MAX_CONCURRENT: usize = 2;
const DEFAULT_MAX_QUEUE_SIZE: usize = 20;
const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_AVG_SERVICE_TIME: Duration = Duration::from_secs(15);

const PROCESSING_AVG_SERVICE_TIME: Duration = Duration::from_secs(30);
const DOWNLOAD_AVG_SERVICE_TIME: Duration = Duration::from_secs(10);
const IMAGE_AVG_SERVICE_TIME: Duration = Duration::from_secs(3);
const IMAGE_ADMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Coarse health signal derived from queue fullness and saturation.
///
/// Ordered by severity so the worst of several values is simply `max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Degraded,
    Critical,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy => write!(f, "healthy"),
            Health::Degraded => write!(f, "degraded"),
            Health::Critical => write!(f, "critical"),
        }
    }
}

/// Load indicator shown to end users next to the wait estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerLoad {
    Low,
    Medium,
    High,
}

impl ServerLoad {
    pub fn from_occupancy(active: usize, max_concurrent: usize) -> Self {
        if active >= max_concurrent {
            ServerLoad::High
        } else if active > 0 {
            ServerLoad::Medium
        } else {
            ServerLoad::Low
        }
    }
}

/// Health classification thresholds (policy constants, not derived)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthPolicy {
    pub critical_ratio: f64,
    pub degraded_ratio: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            critical_ratio: DEFAULT_CRITICAL_RATIO,
            degraded_ratio: DEFAULT_DEGRADED_RATIO,
        }
    }
}

impl HealthPolicy {
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 < self.degraded_ratio
            && self.degraded_ratio <= self.critical_ratio
            && self.critical_ratio <= 1.0;
        if !ordered {
            return Err(DomainError::InvalidConfig(format!(
                "health thresholds must satisfy 0 < degraded ({}) <= critical ({}) <= 1",
                self.degraded_ratio, self.critical_ratio
            )));
        }
        Ok(())
    }

    /// Classify a queue from its counters.
    ///
    /// `critical` when the pending list is at least `critical_ratio` full,
    /// `degraded` when it is at least `degraded_ratio` full or every slot is
    /// busy, `healthy` otherwise.
    pub fn classify(
        &self,
        active: usize,
        queued: usize,
        max_concurrent: usize,
        max_queue_size: usize,
    ) -> Health {
        let fullness = if max_queue_size == 0 {
            1.0
        } else {
            queued as f64 / max_queue_size as f64
        };

        if fullness >= self.critical_ratio {
            Health::Critical
        } else if fullness >= self.degraded_ratio || active >= max_concurrent {
            Health::Degraded
        } else {
            Health::Healthy
        }
    }
}

/// Projected wait in whole seconds for a hypothetical new arrival.
///
/// Little's-law style approximation: zero while a slot is free, otherwise
/// `ceil((queued + 1) * avg_service / max_concurrent)`.
pub fn estimate_wait_secs(
    active: usize,
    queued: usize,
    max_concurrent: usize,
    avg_service_time: Duration,
) -> u64 {
    if active < max_concurrent || max_concurrent == 0 {
        return 0;
    }
    let projected = (queued + 1) as f64 * avg_service_time.as_secs_f64() / max_concurrent as f64;
    projected.ceil() as u64
}

/// Queue configuration, immutable for the lifetime of a gate
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    pub name: QueueId,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub default_timeout: Duration,
    /// Used only for wait-time projection
    pub avg_service_time: Duration,
    pub health_policy: HealthPolicy,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>, max_concurrent: usize, max_queue_size: usize) -> Self {
        Self {
            name: name.into(),
            max_concurrent,
            max_queue_size,
            default_timeout: DEFAULT_ADMISSION_TIMEOUT,
            avg_service_time: DEFAULT_AVG_SERVICE_TIME,
            health_policy: HealthPolicy::default(),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_avg_service_time(mut self, avg: Duration) -> Self {
        self.avg_service_time = avg;
        self
    }

    pub fn with_health_policy(mut self, policy: HealthPolicy) -> Self {
        self.health_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidConfig(
                "queue name cannot be empty".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(DomainError::InvalidConfig(format!(
                "queue '{}': max_concurrent must be at least 1",
                self.name
            )));
        }
        if self.max_queue_size == 0 {
            return Err(DomainError::InvalidConfig(format!(
                "queue '{}': max_queue_size must be at least 1",
                self.name
            )));
        }
        if self.default_timeout.is_zero() {
            return Err(DomainError::InvalidConfig(format!(
                "queue '{}': default timeout must be positive",
                self.name
            )));
        }
        self.health_policy.validate()
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(PROCESSING_QUEUE, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_QUEUE_SIZE)
    }
}

/// Environment-level knobs for the three stock queues.
///
/// The image queue is derived from the processing values: twice the
/// concurrency and queue size, a 30s admission timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    pub processing_max_concurrent: usize,
    pub processing_max_queue_size: usize,
    pub processing_timeout: Duration,
    pub download_max_concurrent: usize,
    pub download_max_queue_size: usize,
    pub download_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            processing_max_concurrent: 2,
            processing_max_queue_size: 50,
            processing_timeout: Duration::from_secs(180),
            download_max_concurrent: 2,
            download_max_queue_size: 20,
            download_timeout: Duration::from_secs(60),
        }
    }
}

impl QueueSettings {
    pub fn processing(&self) -> QueueConfig {
        QueueConfig::new(
            PROCESSING_QUEUE,
            self.processing_max_concurrent,
            self.processing_max_queue_size,
        )
        .with_default_timeout(self.processing_timeout)
        .with_avg_service_time(PROCESSING_AVG_SERVICE_TIME)
    }

    pub fn download(&self) -> QueueConfig {
        QueueConfig::new(
            DOWNLOAD_QUEUE,
            self.download_max_concurrent,
            self.download_max_queue_size,
        )
        .with_default_timeout(self.download_timeout)
        .with_avg_service_time(DOWNLOAD_AVG_SERVICE_TIME)
    }

    /// # Errors
    /// - DomainError::InvalidConfig if doubling the processing values overflows
    pub fn image(&self) -> Result<QueueConfig> {
        let doubled = |value: usize, what: &str| {
            value.checked_mul(2).ok_or_else(|| {
                DomainError::InvalidConfig(format!(
                    "queue '{}': processing {} {} is too large to derive from",
                    IMAGE_QUEUE, what, value
                ))
            })
        };
        Ok(QueueConfig::new(
            IMAGE_QUEUE,
            doubled(self.processing_max_concurrent, "max_concurrent")?,
            doubled(self.processing_max_queue_size, "max_queue_size")?,
        )
        .with_default_timeout(IMAGE_ADMISSION_TIMEOUT)
        .with_avg_service_time(IMAGE_AVG_SERVICE_TIME))
    }
}

/// Counters of one gate at a single instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: QueueId,
    pub active: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub total_processed: u64,
    pub total_timeouts: u64,
    pub total_abandoned: u64,
    pub avg_wait_ms: u64,
}

/// Introspection snapshot served to pollers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    #[serde(flatten)]
    pub stats: QueueStats,
    pub estimated_wait_seconds: u64,
    pub health: Health,
    pub server_load: ServerLoad,
}
