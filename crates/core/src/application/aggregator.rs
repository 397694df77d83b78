// Multi-Queue Aggregator
//
// Owns the named admission gates and reports on them as a whole.

use crate::application::admission::AdmissionGate;
use crate::domain::{DomainError, Health, QueueConfig, QueueSettings, QueueStatus};
use serde::Serialize;
use tracing::info;

/// Combined view over every registered gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateStatus {
    pub active: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub overall_health: Health,
    pub accepting: bool,
    pub queues: Vec<QueueStatus>,
}

#[derive(Default)]
pub struct QueueAggregator {
    gates: Vec<AdmissionGate>,
}

impl QueueAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processing, download and image gates built from one settings block
    pub fn standard(settings: &QueueSettings) -> Result<Self, DomainError> {
        let mut aggregator = Self::new();
        for config in [settings.processing(), settings.download(), settings.image()?] {
            aggregator.register(config)?;
        }
        Ok(aggregator)
    }

    /// Create and register a gate
    ///
    /// # Errors
    /// - DomainError::DuplicateQueue if the name is taken
    /// - DomainError::InvalidConfig if the configuration is unusable
    pub fn register(&mut self, config: QueueConfig) -> Result<AdmissionGate, DomainError> {
        if self.gate(&config.name).is_some() {
            return Err(DomainError::DuplicateQueue(config.name));
        }
        let gate = AdmissionGate::new(config)?;
        info!(
            queue = %gate.name(),
            max_concurrent = gate.config().max_concurrent,
            max_queue_size = gate.config().max_queue_size,
            default_timeout_ms = gate.config().default_timeout.as_millis() as u64,
            "Admission gate registered"
        );
        self.gates.push(gate.clone());
        Ok(gate)
    }

    pub fn gate(&self, name: &str) -> Option<&AdmissionGate> {
        self.gates.iter().find(|gate| gate.name() == name)
    }

    pub fn gates(&self) -> &[AdmissionGate] {
        &self.gates
    }

    /// Worst health across all gates; an empty aggregator is healthy
    pub fn overall_health(&self) -> Health {
        self.gates
            .iter()
            .map(AdmissionGate::health)
            .max()
            .unwrap_or(Health::Healthy)
    }

    /// True only if every gate would accept a new request
    pub fn can_accept_requests(&self) -> bool {
        self.gates.iter().all(AdmissionGate::is_accepting)
    }

    /// Snapshot of every gate plus the sums.
    ///
    /// Each gate is read under its own lock; totals are consistent per gate,
    /// not across gates.
    pub fn status(&self) -> AggregateStatus {
        let queues: Vec<QueueStatus> = self.gates.iter().map(AdmissionGate::status).collect();

        AggregateStatus {
            active: queues.iter().map(|q| q.stats.active).sum(),
            queued: queues.iter().map(|q| q.stats.queued).sum(),
            max_concurrent: queues.iter().map(|q| q.stats.max_concurrent).sum(),
            overall_health: queues
                .iter()
                .map(|q| q.health)
                .max()
                .unwrap_or(Health::Healthy),
            accepting: queues.iter().all(|q| {
                q.stats.active < q.stats.max_concurrent || q.stats.queued < q.stats.max_queue_size
            }),
            queues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DOWNLOAD_QUEUE, IMAGE_QUEUE, PROCESSING_QUEUE};
    use tokio_test::assert_pending;
    use tokio_test::task;

    #[test]
    fn test_empty_aggregator_is_healthy() {
        let aggregator = QueueAggregator::new();
        assert_eq!(aggregator.overall_health(), Health::Healthy);
        assert!(aggregator.can_accept_requests());
        assert_eq!(aggregator.status().queues.len(), 0);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut aggregator = QueueAggregator::new();
        aggregator.register(QueueConfig::new("q", 1, 1)).unwrap();
        let err = aggregator.register(QueueConfig::new("q", 2, 2)).unwrap_err();
        assert_eq!(err, DomainError::DuplicateQueue("q".to_string()));
        assert_eq!(aggregator.gates().len(), 1);
    }

    #[test]
    fn test_standard_gates() {
        let aggregator = QueueAggregator::standard(&QueueSettings::default()).unwrap();
        let names: Vec<&str> = aggregator.gates().iter().map(|g| g.name()).collect();
        assert_eq!(names, vec![PROCESSING_QUEUE, DOWNLOAD_QUEUE, IMAGE_QUEUE]);

        let status = aggregator.status();
        // 2 + 2 + 4
        assert_eq!(status.max_concurrent, 8);
        assert!(status.accepting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worst_health_wins_and_acceptance_is_conjunctive() {
        let mut aggregator = QueueAggregator::new();
        let g1 = aggregator.register(QueueConfig::new("g1", 1, 10)).unwrap();
        let g2 = aggregator.register(QueueConfig::new("g2", 1, 2)).unwrap();

        // g1: one queued of ten, slot busy -> degraded
        let _g1_holder = g1.acquire("g1-a", None).await.unwrap();
        let mut g1_waiter = task::spawn(g1.acquire("g1-b", None));
        assert_pending!(g1_waiter.poll());
        assert_eq!(g1.health(), Health::Degraded);

        // g2: queue full -> critical
        let _g2_holder = g2.acquire("g2-a", None).await.unwrap();
        let mut g2_b = task::spawn(g2.acquire("g2-b", None));
        let mut g2_c = task::spawn(g2.acquire("g2-c", None));
        assert_pending!(g2_b.poll());
        assert_pending!(g2_c.poll());
        assert_eq!(g2.health(), Health::Critical);

        assert_eq!(aggregator.overall_health(), Health::Critical);
        assert!(g1.is_accepting());
        assert!(!aggregator.can_accept_requests());

        let status = aggregator.status();
        assert_eq!(status.active, 2);
        assert_eq!(status.queued, 3);
        assert_eq!(status.overall_health, Health::Critical);
        assert!(!status.accepting);
    }
}
