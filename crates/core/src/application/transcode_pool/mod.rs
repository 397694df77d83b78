//! Transcode Worker Pool
//!
//! Runs at most `max_concurrent` executor processes at once. Extra jobs wait
//! in an unbounded FIFO queue and are started as soon as any running job
//! exits, whatever the exit path. Each running job is supervised by its own
//! task; a supervisor panic surfaces as `TranscodeError::Supervision` and
//! still frees the slot.

pub mod command;
mod supervisor;

pub use command::{build_args, build_filter_chain, escape_drawtext, Corner, WatermarkSpec};

use crate::application::constants::{
    DEFAULT_POOL_CONCURRENCY, DIAGNOSTIC_TAIL_CHARS, IMAGE_JOB_TIMEOUT, KILL_GRACE_PERIOD,
    VIDEO_JOB_TIMEOUT,
};
use crate::application::shutdown::{shutdown_channel, ShutdownSender};
use crate::domain::{DomainError, JobId, JobKind, JobState, TranscodeJob};
use crate::error::TranscodeError;
use crate::port::TranscodeLauncher;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{error, info};

/// Pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_concurrent: usize,
    pub image_timeout: Duration,
    pub video_timeout: Duration,
    /// Delay between the graceful and the forceful signal
    pub kill_grace: Duration,
    pub diagnostic_tail_chars: usize,
    pub watermark: WatermarkSpec,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_POOL_CONCURRENCY,
            image_timeout: IMAGE_JOB_TIMEOUT,
            video_timeout: VIDEO_JOB_TIMEOUT,
            kill_grace: KILL_GRACE_PERIOD,
            diagnostic_tail_chars: DIAGNOSTIC_TAIL_CHARS,
            watermark: WatermarkSpec::default(),
        }
    }
}

impl PoolConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..Self::default()
        }
    }

    pub fn with_timeouts(mut self, image: Duration, video: Duration) -> Self {
        self.image_timeout = image;
        self.video_timeout = video;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_diagnostic_tail_chars(mut self, chars: usize) -> Self {
        self.diagnostic_tail_chars = chars;
        self
    }

    pub fn with_watermark(mut self, watermark: WatermarkSpec) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn timeout_for(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Image => self.image_timeout,
            JobKind::Video => self.video_timeout,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_concurrent == 0 {
            return Err(DomainError::InvalidConfig(
                "pool max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.image_timeout.is_zero() || self.video_timeout.is_zero() {
            return Err(DomainError::InvalidConfig(
                "pool job timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pool occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub active: usize,
    pub queued: usize,
    pub max_concurrent: usize,
}

type JobReply = oneshot::Sender<Result<PathBuf, TranscodeError>>;

struct QueuedJob {
    job: TranscodeJob,
    reply: JobReply,
}

struct PoolState {
    active: usize,
    queue: VecDeque<QueuedJob>,
    jobs: HashMap<JobId, JobState>,
    shutting_down: bool,
}

struct PoolInner {
    config: PoolConfig,
    launcher: Arc<dyn TranscodeLauncher>,
    state: Mutex<PoolState>,
    shutdown: ShutdownSender,
    idle: Notify,
}

/// Shared handle to the transcode pool
#[derive(Clone)]
pub struct TranscodePool {
    inner: Arc<PoolInner>,
}

impl TranscodePool {
    pub fn new(
        config: PoolConfig,
        launcher: Arc<dyn TranscodeLauncher>,
    ) -> Result<Self, DomainError> {
        config.validate()?;
        let (shutdown, _token) = shutdown_channel();
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                launcher,
                state: Mutex::new(PoolState {
                    active: 0,
                    queue: VecDeque::new(),
                    jobs: HashMap::new(),
                    shutting_down: false,
                }),
                shutdown,
                idle: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a job and wait for its output path.
    ///
    /// # Errors
    /// - TranscodeError::InvalidJob for malformed or duplicate jobs
    /// - TranscodeError::TimedOut / Failed / ExecutorUnavailable / Supervision
    /// - TranscodeError::PoolShutdown if the pool stops first
    ///
    /// Dropping the returned future does not cancel the job.
    pub async fn submit(&self, job: TranscodeJob) -> Result<PathBuf, TranscodeError> {
        job.validate()
            .map_err(|e| TranscodeError::InvalidJob(e.to_string()))?;
        if job.state != JobState::Queued {
            return Err(TranscodeError::InvalidJob(format!(
                "job {} is {}, expected QUEUED",
                job.id, job.state
            )));
        }

        let job_id = job.id.clone();
        let (reply, rx) = oneshot::channel();

        let start_now = {
            let mut state = self.lock();
            if state.shutting_down {
                return Err(TranscodeError::PoolShutdown { job_id });
            }
            if state.jobs.contains_key(&job_id) {
                return Err(TranscodeError::InvalidJob(format!(
                    "job {} is already queued or running",
                    job_id
                )));
            }

            if state.active < self.inner.config.max_concurrent {
                state.active += 1;
                state.jobs.insert(job_id.clone(), JobState::Running);
                Some(QueuedJob { job, reply })
            } else {
                state.jobs.insert(job_id.clone(), JobState::Queued);
                state.queue.push_back(QueuedJob { job, reply });
                info!(
                    job_id = %job_id,
                    queued = state.queue.len(),
                    "Transcode slots busy, job queued"
                );
                None
            }
        };

        if let Some(queued) = start_now {
            self.spawn_job(queued);
        }

        rx.await.unwrap_or_else(|_| {
            Err(TranscodeError::Supervision {
                job_id,
                reason: "job supervisor dropped its reply".to_string(),
            })
        })
    }

    fn spawn_job(&self, queued: QueuedJob) {
        let QueuedJob { job, reply } = queued;
        let pool = self.clone();
        let job_id = job.id.clone();
        let token = self.inner.shutdown.subscribe();

        tokio::spawn(async move {
            let inner = Arc::clone(&pool.inner);
            let supervised = tokio::spawn(async move {
                supervisor::supervise(inner.launcher.as_ref(), &inner.config, job, token).await
            });

            let result = match supervised.await {
                Ok(result) => result,
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        supervisor::panic_message(join_error.into_panic())
                    } else {
                        "supervisor task cancelled".to_string()
                    };
                    error!(job_id = %job_id, reason = %reason, "Transcode supervisor panicked");
                    Err(TranscodeError::Supervision {
                        job_id: job_id.clone(),
                        reason,
                    })
                }
            };

            pool.finish(&job_id);
            let _ = reply.send(result);
        });
    }

    /// Free the slot of a finished job and start whatever fits
    fn finish(&self, job_id: &str) {
        let to_start = {
            let mut state = self.lock();
            state.jobs.remove(job_id);
            state.active = state.active.saturating_sub(1);

            let mut to_start = Vec::new();
            while state.active < self.inner.config.max_concurrent && !state.shutting_down {
                let Some(next) = state.queue.pop_front() else {
                    break;
                };
                state.active += 1;
                state.jobs.insert(next.job.id.clone(), JobState::Running);
                to_start.push(next);
            }
            if state.active == 0 {
                self.inner.idle.notify_waiters();
            }
            to_start
        };

        for next in to_start {
            self.spawn_job(next);
        }
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.lock();
        PoolStatus {
            active: state.active,
            queued: state.queue.len(),
            max_concurrent: self.inner.config.max_concurrent,
        }
    }

    /// State of a job still queued or running, `None` once it has finished
    pub fn job_state(&self, job_id: &str) -> Option<JobState> {
        self.lock().jobs.get(job_id).copied()
    }

    /// Stop accepting work, fail queued jobs, terminate running ones and
    /// wait until every supervisor has finished.
    pub async fn shutdown(&self) {
        let drained: Vec<QueuedJob> = {
            let mut state = self.lock();
            state.shutting_down = true;
            let drained: Vec<QueuedJob> = state.queue.drain(..).collect();
            for queued in &drained {
                state.jobs.remove(&queued.job.id);
            }
            drained
        };

        info!(
            drained = drained.len(),
            running = self.status().active,
            "Transcode pool shutting down"
        );
        for queued in drained {
            let _ = queued.reply.send(Err(TranscodeError::PoolShutdown {
                job_id: queued.job.id,
            }));
        }

        self.inner.shutdown.shutdown();

        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.lock().active == 0 {
                break;
            }
            notified.await;
        }
        info!("Transcode pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::transcode_launcher::mocks::{MockBehavior, MockLauncher};
    use crate::port::TerminationSignal;
    use futures::future::join_all;
    use tokio::time::Instant;

    fn image_job(id: &str) -> TranscodeJob {
        TranscodeJob::new(id, JobKind::Image, "/in/a.png", format!("/out/{id}.jpg"), 1080, 1080)
    }

    fn video_job(id: &str) -> TranscodeJob {
        TranscodeJob::new(id, JobKind::Video, "/in/a.mov", format!("/out/{id}.mp4"), 1080, 1920)
    }

    fn pool_with(config: PoolConfig, launcher: Arc<MockLauncher>) -> TranscodePool {
        TranscodePool::new(config, launcher).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_output_path() {
        let launcher = Arc::new(MockLauncher::new(MockBehavior::success_after(
            Duration::from_millis(20),
        )));
        let pool = pool_with(PoolConfig::new(2), Arc::clone(&launcher));

        let output = pool.submit(image_job("img-1")).await.unwrap();
        assert_eq!(output, PathBuf::from("/out/img-1.jpg"));
        assert_eq!(pool.job_state("img-1"), None);
        assert_eq!(pool.status().active, 0);

        let launches = launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].args.first().map(String::as_str), Some("-i"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_diagnostics_are_bounded() {
        let noisy = "x".repeat(4_000) + "moov atom not found";
        let launcher = Arc::new(MockLauncher::new(MockBehavior::fail(1, noisy)));
        let pool = pool_with(
            PoolConfig::new(1).with_diagnostic_tail_chars(100),
            launcher,
        );

        let err = pool.submit(video_job("v-1")).await.unwrap_err();
        match err {
            TranscodeError::Failed {
                exit_code,
                diagnostics,
                ..
            } => {
                assert_eq!(exit_code, Some(1));
                assert_eq!(diagnostics.chars().count(), 100);
                assert!(diagnostics.ends_with("moov atom not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_escalates_to_forceful_kill() {
        let launcher = Arc::new(MockLauncher::new(MockBehavior::IgnoreGraceful));
        let config = PoolConfig::new(1)
            .with_timeouts(Duration::from_millis(100), Duration::from_millis(100))
            .with_kill_grace(Duration::from_millis(50));
        let pool = pool_with(config, Arc::clone(&launcher));

        let started = Instant::now();
        let err = pool.submit(video_job("stuck")).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(
            err,
            TranscodeError::TimedOut {
                job_id: "stuck".to_string(),
                timeout_ms: 100,
                forced_kill: true,
            }
        );
        assert!(elapsed >= Duration::from_millis(150), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(250), "elapsed {elapsed:?}");
        assert_eq!(
            launcher.signals_for("stuck"),
            vec![TerminationSignal::Graceful, TerminationSignal::Forceful]
        );
        assert_eq!(launcher.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_graceful_exit_skips_kill() {
        let launcher = Arc::new(MockLauncher::new(MockBehavior::ExitOnSignal));
        let config = PoolConfig::new(1)
            .with_timeouts(Duration::from_millis(100), Duration::from_millis(100))
            .with_kill_grace(Duration::from_millis(50));
        let pool = pool_with(config, Arc::clone(&launcher));

        let err = pool.submit(image_job("polite")).await.unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::TimedOut {
                forced_kill: false,
                ..
            }
        ));
        assert_eq!(
            launcher.signals_for("polite"),
            vec![TerminationSignal::Graceful]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap_and_queue_advance() {
        let launcher = Arc::new(MockLauncher::new(MockBehavior::success_after(
            Duration::from_millis(100),
        )));
        let pool = pool_with(PoolConfig::new(2), Arc::clone(&launcher));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.submit(image_job(&format!("job-{i}"))).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(1)).await;
        let status = pool.status();
        assert_eq!(status.active, 2);
        assert_eq!(status.queued, 3);
        assert_eq!(pool.job_state("job-0"), Some(JobState::Running));
        assert_eq!(pool.job_state("job-4"), Some(JobState::Queued));

        for result in join_all(handles).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(launcher.peak_running(), 2);
        assert_eq!(launcher.launches().len(), 5);
        assert_eq!(pool.status().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_and_panic_still_advance_queue() {
        let launcher = Arc::new(
            MockLauncher::new(MockBehavior::success_after(Duration::from_millis(10)))
                .with_job_behavior("missing", MockBehavior::SpawnFails("ffmpeg not found".into()))
                .with_job_behavior("boom", MockBehavior::Panic("decoder exploded".into())),
        );
        let pool = pool_with(PoolConfig::new(1), Arc::clone(&launcher));

        let submit = |id: &'static str| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit(image_job(id)).await })
        };
        let missing = submit("missing");
        let boom = submit("boom");
        let fine = submit("fine");

        assert!(matches!(
            missing.await.unwrap(),
            Err(TranscodeError::ExecutorUnavailable { ref reason, .. })
                if reason.contains("ffmpeg not found")
        ));
        assert!(matches!(
            boom.await.unwrap(),
            Err(TranscodeError::Supervision { ref reason, .. })
                if reason.contains("decoder exploded")
        ));
        assert!(fine.await.unwrap().is_ok());
        assert_eq!(pool.status().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_and_invalid_jobs_are_rejected() {
        let launcher = Arc::new(MockLauncher::new(MockBehavior::success_after(
            Duration::from_millis(100),
        )));
        let pool = pool_with(PoolConfig::new(1), launcher);

        let first = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit(image_job("same")).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        let err = pool.submit(image_job("same")).await.unwrap_err();
        assert!(matches!(err, TranscodeError::InvalidJob(_)));

        let mut zero = image_job("zero");
        zero.width = 0;
        assert!(matches!(
            pool.submit(zero).await,
            Err(TranscodeError::InvalidJob(_))
        ));

        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_terminates_running_and_drains_queue() {
        let launcher = Arc::new(MockLauncher::new(MockBehavior::IgnoreGraceful));
        let config = PoolConfig::new(1).with_kill_grace(Duration::from_millis(50));
        let pool = pool_with(config, Arc::clone(&launcher));

        let running = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit(video_job("running")).await })
        };
        let queued = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.submit(video_job("queued")).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(pool.status().queued, 1);

        pool.shutdown().await;

        assert_eq!(
            running.await.unwrap(),
            Err(TranscodeError::PoolShutdown {
                job_id: "running".to_string()
            })
        );
        assert_eq!(
            queued.await.unwrap(),
            Err(TranscodeError::PoolShutdown {
                job_id: "queued".to_string()
            })
        );
        assert_eq!(
            launcher.signals_for("running"),
            vec![TerminationSignal::Graceful, TerminationSignal::Forceful]
        );
        assert_eq!(launcher.launched_ids(), vec!["running".to_string()]);

        let late = pool.submit(image_job("late")).await;
        assert!(matches!(late, Err(TranscodeError::PoolShutdown { .. })));
    }

    #[test]
    fn test_config_validation() {
        assert!(PoolConfig::new(0).validate().is_err());
        assert!(PoolConfig::new(1)
            .with_timeouts(Duration::ZERO, Duration::from_secs(1))
            .validate()
            .is_err());
        assert_eq!(
            PoolConfig::default().timeout_for(JobKind::Video),
            Duration::from_secs(180)
        );
    }
}
