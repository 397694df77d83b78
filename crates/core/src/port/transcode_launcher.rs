// Transcode Launcher Port
// Abstraction over spawning, waiting on and signalling the external executor

use crate::domain::JobId;
use async_trait::async_trait;
use thiserror::Error;

/// Fully built executor invocation for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub job_id: JobId,
    pub args: Vec<String>,
}

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// `None` when the process was ended by a signal
    pub exit_code: Option<i32>,
    /// Tail of the process's stderr, bounded by the launcher
    pub diagnostics: String,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Two-stage termination: ask first, then force
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGTERM on unix
    Graceful,
    /// SIGKILL on unix
    Forceful,
}

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Signal delivery failed: {0}")]
    Signal(String),

    #[error("Waiting on process failed: {0}")]
    Wait(String),

    #[error("Process timeout after {0}ms")]
    Timeout(u64),
}

/// Spawns executor processes
///
/// Implementations:
/// - ProcessLauncher (infra-system): tokio child process + OS signals
/// - mocks::MockLauncher: scripted behaviour with recorded signals
pub trait TranscodeLauncher: Send + Sync {
    /// Start the executor for `invocation`
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the executor is missing or not runnable
    fn launch(&self, invocation: &Invocation) -> Result<Box<dyn RunningTranscode>, ExecutionError>;
}

/// Handle to one running executor process, exclusively owned by the pool
#[async_trait]
pub trait RunningTranscode: Send {
    /// OS process id while known
    fn pid(&self) -> Option<u32>;

    /// Wait for the process itself to exit, without collecting diagnostics.
    ///
    /// Must be cancel safe: the pool races it against timers and calls it
    /// again after signalling.
    async fn wait_exit(&mut self) -> Result<(), ExecutionError> {
        self.wait().await.map(|_| ())
    }

    /// Wait for exit, then gather the exit code and diagnostics
    async fn wait(&mut self) -> Result<ExitReport, ExecutionError>;

    /// Deliver a termination signal. Signalling an exited process is a no-op.
    fn signal(&mut self, signal: TerminationSignal) -> Result<(), ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::time::Instant;

    /// Mock process behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Exit by itself after `after` unless a signal ends it first
        Exit {
            code: i32,
            diagnostics: String,
            after: Duration,
        },
        /// Run until any termination signal arrives
        ExitOnSignal,
        /// Ignore the graceful signal, only the forceful kill ends it
        IgnoreGraceful,
        /// Fail to spawn with the given reason
        SpawnFails(String),
        /// Panic while being waited on
        Panic(String),
    }

    impl MockBehavior {
        pub fn success_after(after: Duration) -> Self {
            MockBehavior::Exit {
                code: 0,
                diagnostics: String::new(),
                after,
            }
        }

        pub fn fail(code: i32, diagnostics: impl Into<String>) -> Self {
            MockBehavior::Exit {
                code,
                diagnostics: diagnostics.into(),
                after: Duration::ZERO,
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        launches: Mutex<Vec<Invocation>>,
        signals: Mutex<Vec<(JobId, TerminationSignal)>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    /// Mock Launcher for testing
    pub struct MockLauncher {
        default: MockBehavior,
        per_job: Mutex<HashMap<JobId, MockBehavior>>,
        recorder: Arc<Recorder>,
    }

    impl MockLauncher {
        pub fn new(default: MockBehavior) -> Self {
            Self {
                default,
                per_job: Mutex::new(HashMap::new()),
                recorder: Arc::new(Recorder::default()),
            }
        }

        /// Override the behaviour of one job id
        pub fn with_job_behavior(self, job_id: impl Into<String>, behavior: MockBehavior) -> Self {
            self.per_job.lock().unwrap().insert(job_id.into(), behavior);
            self
        }

        pub fn launches(&self) -> Vec<Invocation> {
            self.recorder.launches.lock().unwrap().clone()
        }

        pub fn launched_ids(&self) -> Vec<JobId> {
            self.launches().into_iter().map(|i| i.job_id).collect()
        }

        /// Signals received by one job, in delivery order
        pub fn signals_for(&self, job_id: &str) -> Vec<TerminationSignal> {
            self.recorder
                .signals
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| id == job_id)
                .map(|(_, signal)| *signal)
                .collect()
        }

        /// Processes launched and not yet reaped
        pub fn running(&self) -> usize {
            self.recorder.running.load(Ordering::SeqCst)
        }

        /// Highest number of simultaneously running processes observed
        pub fn peak_running(&self) -> usize {
            self.recorder.peak.load(Ordering::SeqCst)
        }
    }

    impl TranscodeLauncher for MockLauncher {
        fn launch(
            &self,
            invocation: &Invocation,
        ) -> Result<Box<dyn RunningTranscode>, ExecutionError> {
            let behavior = self
                .per_job
                .lock()
                .unwrap()
                .get(&invocation.job_id)
                .cloned()
                .unwrap_or_else(|| self.default.clone());

            self.recorder
                .launches
                .lock()
                .unwrap()
                .push(invocation.clone());

            if let MockBehavior::SpawnFails(reason) = &behavior {
                return Err(ExecutionError::SpawnFailed(reason.clone()));
            }

            let running = self.recorder.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.recorder.peak.fetch_max(running, Ordering::SeqCst);

            let (exit_tx, _) = watch::channel(None);
            Ok(Box::new(MockProcess {
                job_id: invocation.job_id.clone(),
                behavior,
                started: Instant::now(),
                exit_tx,
                exited: false,
                recorder: Arc::clone(&self.recorder),
            }))
        }
    }

    struct MockProcess {
        job_id: JobId,
        behavior: MockBehavior,
        started: Instant,
        exit_tx: watch::Sender<Option<ExitReport>>,
        exited: bool,
        recorder: Arc<Recorder>,
    }

    impl MockProcess {
        fn mark_exited(&mut self) {
            if !self.exited {
                self.exited = true;
                self.recorder.running.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl RunningTranscode for MockProcess {
        fn pid(&self) -> Option<u32> {
            None
        }

        async fn wait(&mut self) -> Result<ExitReport, ExecutionError> {
            if let MockBehavior::Panic(msg) = &self.behavior {
                panic!("{}", msg);
            }

            let natural = match &self.behavior {
                MockBehavior::Exit {
                    code,
                    diagnostics,
                    after,
                } => Some((
                    self.started + *after,
                    ExitReport {
                        exit_code: Some(*code),
                        diagnostics: diagnostics.clone(),
                    },
                )),
                _ => None,
            };

            let mut exit_rx = self.exit_tx.subscribe();
            let report = loop {
                let signalled = exit_rx.borrow_and_update().clone();
                if let Some(report) = signalled {
                    break report;
                }
                match &natural {
                    Some((deadline, report)) => tokio::select! {
                        _ = tokio::time::sleep_until(*deadline) => break report.clone(),
                        _ = exit_rx.changed() => continue,
                    },
                    None => {
                        let _ = exit_rx.changed().await;
                    }
                }
            };

            self.mark_exited();
            Ok(report)
        }

        fn signal(&mut self, signal: TerminationSignal) -> Result<(), ExecutionError> {
            self.recorder
                .signals
                .lock()
                .unwrap()
                .push((self.job_id.clone(), signal));

            if self.exited {
                return Ok(());
            }

            let terminates = !matches!(
                (&self.behavior, signal),
                (MockBehavior::IgnoreGraceful, TerminationSignal::Graceful)
            );
            if terminates {
                self.exit_tx.send_replace(Some(ExitReport {
                    exit_code: None,
                    diagnostics: format!("terminated by {:?} signal", signal),
                }));
            }
            Ok(())
        }
    }
}
