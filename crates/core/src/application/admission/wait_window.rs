// Rolling window of admission wait samples

use std::collections::VecDeque;
use std::time::Duration;

/// Keeps the last `capacity` waits and their running sum
#[derive(Debug)]
pub struct WaitWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
    total: Duration,
}

impl WaitWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            total: Duration::ZERO,
        }
    }

    pub fn record(&mut self, wait: Duration) {
        if self.samples.len() == self.capacity {
            if let Some(evicted) = self.samples.pop_front() {
                self.total = self.total.saturating_sub(evicted);
            }
        }
        self.samples.push_back(wait);
        self.total += wait;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean wait in whole milliseconds, 0 with no samples
    pub fn average_ms(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        (self.total.as_millis() / self.samples.len() as u128) as u64
    }
}
