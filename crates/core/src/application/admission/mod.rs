//! Admission Gate
//!
//! Bounded-concurrency gate in front of one class of heavy work. At most
//! `max_concurrent` permits are outstanding; up to `max_queue_size` further
//! callers wait in FIFO order; everyone else is turned away at once.
//!
//! All bookkeeping sits behind one `std::sync::Mutex` that is never held
//! across an await. A queued caller parks on a oneshot; promotion pops the
//! head of the pending list, takes the slot and sends on that oneshot while
//! still holding the lock, so a racing timeout that re-takes the lock either
//! still finds its ticket (and wins) or finds it gone (and takes the permit).

mod wait_window;

pub use wait_window::WaitWindow;

use crate::application::constants::WAIT_WINDOW_CAPACITY;
use crate::domain::{
    estimate_wait_secs, DomainError, Health, QueueConfig, QueueStats, QueueStatus, ServerLoad,
};
use crate::error::AdmissionError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct PendingAdmission {
    ticket: u64,
    request_id: String,
    enqueued_at: Instant,
    promote: oneshot::Sender<Duration>,
}

struct GateState {
    active: usize,
    pending: VecDeque<PendingAdmission>,
    next_ticket: u64,
    total_processed: u64,
    total_timeouts: u64,
    total_abandoned: u64,
    wait_window: WaitWindow,
}

impl GateState {
    fn ticket_position(&self, ticket: u64) -> Option<usize> {
        self.pending.iter().position(|p| p.ticket == ticket)
    }
}

struct GateInner {
    config: QueueConfig,
    state: Mutex<GateState>,
}

/// Shared handle to one admission gate
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

enum Admission {
    Granted,
    Queued {
        ticket: u64,
        rx: oneshot::Receiver<Duration>,
    },
}

impl AdmissionGate {
    /// Create a gate from a validated configuration
    ///
    /// # Errors
    /// - DomainError::InvalidConfig for zero capacity, zero queue or bad thresholds
    pub fn new(config: QueueConfig) -> Result<Self, DomainError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(GateInner {
                config,
                state: Mutex::new(GateState {
                    active: 0,
                    pending: VecDeque::new(),
                    next_ticket: 0,
                    total_processed: 0,
                    total_timeouts: 0,
                    total_abandoned: 0,
                    wait_window: WaitWindow::new(WAIT_WINDOW_CAPACITY),
                }),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Obtain a slot, waiting in line if every slot is taken.
    ///
    /// # Arguments
    ///
    /// * `request_id` - Caller identifier, used for logging and `position()`
    /// * `timeout` - Maximum time to wait in line (gate default when `None` or zero)
    ///
    /// # Errors
    /// - AdmissionError::QueueSaturated if the pending list is already full
    /// - AdmissionError::AdmissionTimedOut if no slot frees up in time
    ///
    /// Dropping the returned future while it waits withdraws the request.
    pub async fn acquire(
        &self,
        request_id: &str,
        timeout: Option<Duration>,
    ) -> Result<AdmissionPermit, AdmissionError> {
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(self.inner.config.default_timeout);

        let (ticket, rx) = match self.try_admit(request_id)? {
            Admission::Granted => {
                return Ok(AdmissionPermit::new(self.clone(), request_id, Duration::ZERO))
            }
            Admission::Queued { ticket, rx } => (ticket, rx),
        };

        let mut guard = PendingGuard {
            gate: self.clone(),
            ticket,
            request_id: request_id.to_string(),
            rx,
            settled: false,
        };

        match tokio::time::timeout(timeout, &mut guard.rx).await {
            Ok(Ok(waited)) => Ok(guard.into_permit(waited)),
            _ => guard.expire(timeout),
        }
    }

    fn try_admit(&self, request_id: &str) -> Result<Admission, AdmissionError> {
        let config = &self.inner.config;
        let mut state = self.lock();

        if state.active < config.max_concurrent {
            state.active += 1;
            info!(
                queue = %config.name,
                request_id = %request_id,
                active = state.active,
                max_concurrent = config.max_concurrent,
                "Admission granted"
            );
            return Ok(Admission::Granted);
        }

        if state.pending.len() >= config.max_queue_size {
            let retry_after_secs = estimate_wait_secs(
                state.active,
                state.pending.len(),
                config.max_concurrent,
                config.avg_service_time,
            );
            warn!(
                queue = %config.name,
                request_id = %request_id,
                queued = state.pending.len(),
                retry_after_secs,
                "Queue saturated, rejecting request"
            );
            return Err(AdmissionError::QueueSaturated {
                queue: config.name.clone(),
                queued: state.pending.len(),
                retry_after_secs,
            });
        }

        let (tx, rx) = oneshot::channel();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.pending.push_back(PendingAdmission {
            ticket,
            request_id: request_id.to_string(),
            enqueued_at: Instant::now(),
            promote: tx,
        });
        info!(
            queue = %config.name,
            request_id = %request_id,
            position = state.pending.len(),
            "Request queued"
        );
        Ok(Admission::Queued { ticket, rx })
    }

    /// Hand a finished slot back: counts it as processed, then promotes.
    fn release_slot(&self, request_id: &str) {
        let mut state = self.lock();
        state.total_processed += 1;
        self.free_slot_locked(&mut state);
        debug!(
            queue = %self.inner.config.name,
            request_id = %request_id,
            active = state.active,
            queued = state.pending.len(),
            "Admission released"
        );
    }

    fn free_slot_locked(&self, state: &mut GateState) {
        state.active = state.active.saturating_sub(1);
        self.promote_locked(state);
    }

    /// Promote pending requests in FIFO order while slots are free
    fn promote_locked(&self, state: &mut GateState) {
        while state.active < self.inner.config.max_concurrent {
            let Some(next) = state.pending.pop_front() else {
                break;
            };
            let waited = next.enqueued_at.elapsed();
            state.active += 1;
            if next.promote.send(waited).is_err() {
                // Waiter vanished without its guard running; give the slot back
                state.active -= 1;
                continue;
            }
            state.wait_window.record(waited);
            debug!(
                queue = %self.inner.config.name,
                request_id = %next.request_id,
                waited_ms = waited.as_millis() as u64,
                "Pending request promoted"
            );
        }
    }

    /// Counter snapshot
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        self.stats_locked(&state)
    }

    fn stats_locked(&self, state: &GateState) -> QueueStats {
        let config = &self.inner.config;
        QueueStats {
            name: config.name.clone(),
            active: state.active,
            queued: state.pending.len(),
            max_concurrent: config.max_concurrent,
            max_queue_size: config.max_queue_size,
            total_processed: state.total_processed,
            total_timeouts: state.total_timeouts,
            total_abandoned: state.total_abandoned,
            avg_wait_ms: state.wait_window.average_ms(),
        }
    }

    /// Projected wait in seconds for a request arriving now
    pub fn estimated_wait_secs(&self) -> u64 {
        let state = self.lock();
        estimate_wait_secs(
            state.active,
            state.pending.len(),
            self.inner.config.max_concurrent,
            self.inner.config.avg_service_time,
        )
    }

    pub fn health(&self) -> Health {
        let state = self.lock();
        let config = &self.inner.config;
        config.health_policy.classify(
            state.active,
            state.pending.len(),
            config.max_concurrent,
            config.max_queue_size,
        )
    }

    /// Introspection snapshot, taken under a single lock
    pub fn status(&self) -> QueueStatus {
        let state = self.lock();
        let config = &self.inner.config;
        let stats = self.stats_locked(&state);
        QueueStatus {
            estimated_wait_seconds: estimate_wait_secs(
                stats.active,
                stats.queued,
                config.max_concurrent,
                config.avg_service_time,
            ),
            health: config.health_policy.classify(
                stats.active,
                stats.queued,
                config.max_concurrent,
                config.max_queue_size,
            ),
            server_load: ServerLoad::from_occupancy(stats.active, config.max_concurrent),
            stats,
        }
    }

    /// 1-based position of a waiting request, `None` if it is not waiting
    pub fn position(&self, request_id: &str) -> Option<usize> {
        let state = self.lock();
        state
            .pending
            .iter()
            .position(|p| p.request_id == request_id)
            .map(|index| index + 1)
    }

    /// Whether an `acquire` issued now would not be rejected outright
    pub fn is_accepting(&self) -> bool {
        let state = self.lock();
        state.active < self.inner.config.max_concurrent
            || state.pending.len() < self.inner.config.max_queue_size
    }
}

/// Owns a queued request until it is promoted, times out or is abandoned
struct PendingGuard {
    gate: AdmissionGate,
    ticket: u64,
    request_id: String,
    rx: oneshot::Receiver<Duration>,
    settled: bool,
}

impl PendingGuard {
    fn into_permit(mut self, waited: Duration) -> AdmissionPermit {
        self.settled = true;
        AdmissionPermit::new(self.gate.clone(), &self.request_id, waited)
    }

    /// Timer fired: remove our ticket unless a promotion got there first
    fn expire(mut self, timeout: Duration) -> Result<AdmissionPermit, AdmissionError> {
        self.settled = true;
        let gate = self.gate.clone();
        let config = gate.config();
        let mut state = gate.lock();

        if let Some(index) = state.ticket_position(self.ticket) {
            let expired = state.pending.remove(index);
            state.total_timeouts += 1;
            let waited_ms = expired
                .map(|p| p.enqueued_at.elapsed())
                .unwrap_or(timeout)
                .as_millis() as u64;
            let retry_after_secs = estimate_wait_secs(
                state.active,
                state.pending.len(),
                config.max_concurrent,
                config.avg_service_time,
            );
            drop(state);

            warn!(
                queue = %config.name,
                request_id = %self.request_id,
                waited_ms,
                "Admission timed out"
            );
            return Err(AdmissionError::AdmissionTimedOut {
                queue: config.name.clone(),
                request_id: self.request_id.clone(),
                waited_ms,
                retry_after_secs,
            });
        }

        // Ticket already popped under the lock: the promotion has been sent.
        match self.rx.try_recv() {
            Ok(waited) => {
                drop(state);
                debug!(
                    queue = %config.name,
                    request_id = %self.request_id,
                    "Promotion won the race against the admission timeout"
                );
                Ok(AdmissionPermit::new(gate.clone(), &self.request_id, waited))
            }
            Err(_) => {
                let retry_after_secs = estimate_wait_secs(
                    state.active,
                    state.pending.len(),
                    config.max_concurrent,
                    config.avg_service_time,
                );
                Err(AdmissionError::AdmissionTimedOut {
                    queue: config.name.clone(),
                    request_id: self.request_id.clone(),
                    waited_ms: timeout.as_millis() as u64,
                    retry_after_secs,
                })
            }
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let gate = self.gate.clone();
        let mut state = gate.lock();
        if let Some(index) = state.ticket_position(self.ticket) {
            state.pending.remove(index);
            state.total_abandoned += 1;
            debug!(
                queue = %gate.name(),
                request_id = %self.request_id,
                "Pending request abandoned"
            );
        } else if self.rx.try_recv().is_ok() {
            // Promoted but never observed by the caller
            state.total_abandoned += 1;
            gate.free_slot_locked(&mut state);
            debug!(
                queue = %gate.name(),
                request_id = %self.request_id,
                "Abandoned request returned its promoted slot"
            );
        }
    }
}

/// Proof of one occupied slot.
///
/// Move-only; the slot is released exactly once, either by `release()` or
/// when the permit is dropped.
#[must_use = "dropping the permit releases the slot immediately"]
pub struct AdmissionPermit {
    gate: AdmissionGate,
    request_id: String,
    waited: Duration,
}

impl AdmissionPermit {
    fn new(gate: AdmissionGate, request_id: &str, waited: Duration) -> Self {
        Self {
            gate,
            request_id: request_id.to_string(),
            waited,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn queue(&self) -> &str {
        self.gate.name()
    }

    /// Time spent in the pending list (zero for immediate grants)
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Give the slot back and promote the next waiter
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.release_slot(&self.request_id);
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("name", &self.name())
            .field("config", self.config())
            .finish()
    }
}

impl std::fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("queue", &self.gate.name())
            .field("request_id", &self.request_id)
            .field("waited", &self.waited)
            .finish()
    }
}
