// Per-job process supervision
//
// Launch, race exit against the job budget and pool shutdown, escalate
// SIGTERM -> SIGKILL when the budget runs out.

use super::command::build_args;
use super::PoolConfig;
use crate::application::constants::REAP_TIMEOUT;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{tail_chars, TranscodeJob};
use crate::error::TranscodeError;
use crate::port::{
    ExecutionError, Invocation, RunningTranscode, TerminationSignal, TranscodeLauncher,
};
use std::any::Any;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

enum Outcome {
    Exited,
    WaitFailed(ExecutionError),
    TimedOut,
    Shutdown,
}

/// Run one job to completion and map the result to the pool's error model
pub(super) async fn supervise(
    launcher: &dyn TranscodeLauncher,
    config: &PoolConfig,
    mut job: TranscodeJob,
    mut shutdown: ShutdownToken,
) -> Result<PathBuf, TranscodeError> {
    let job_id = job.id.clone();

    if shutdown.is_shutdown() {
        return Err(TranscodeError::PoolShutdown { job_id });
    }
    job.start()
        .map_err(|e| TranscodeError::InvalidJob(e.to_string()))?;

    let invocation = Invocation {
        job_id: job_id.clone(),
        args: build_args(&job, &config.watermark),
    };
    let timeout = config.timeout_for(job.kind);

    let mut process = match launcher.launch(&invocation) {
        Ok(process) => process,
        Err(e) => {
            record_transition(&job_id, job.fail());
            error!(job_id = %job_id, error = %e, "Failed to launch transcode executor");
            return Err(TranscodeError::ExecutorUnavailable {
                job_id,
                reason: e.to_string(),
            });
        }
    };

    let started = Instant::now();
    info!(
        job_id = %job_id,
        kind = %job.kind,
        pid = ?process.pid(),
        timeout_ms = timeout.as_millis() as u64,
        "Transcode started"
    );

    // Only the exit itself races the budget; stderr is collected afterwards
    let outcome = tokio::select! {
        exit = process.wait_exit() => match exit {
            Ok(()) => Outcome::Exited,
            Err(e) => Outcome::WaitFailed(e),
        },
        _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
        _ = shutdown.wait() => Outcome::Shutdown,
    };

    match outcome {
        Outcome::Exited => match process.wait().await {
            Ok(report) if report.success() => {
                record_transition(&job_id, job.complete());
                info!(
                    job_id = %job_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    output = %job.output.display(),
                    "Transcode completed"
                );
                Ok(job.output)
            }
            Ok(report) => {
                record_transition(&job_id, job.fail());
                error!(
                    job_id = %job_id,
                    exit_code = ?report.exit_code,
                    diagnostics = %report.diagnostics,
                    "Transcode failed"
                );
                Err(TranscodeError::Failed {
                    job_id,
                    exit_code: report.exit_code,
                    diagnostics: tail_chars(&report.diagnostics, config.diagnostic_tail_chars),
                })
            }
            Err(e) => Err(wait_failed(&mut job, e)),
        },
        Outcome::WaitFailed(e) => Err(wait_failed(&mut job, e)),
        Outcome::TimedOut => {
            record_transition(&job_id, job.time_out());
            warn!(
                job_id = %job_id,
                timeout_ms = timeout.as_millis() as u64,
                "Transcode exceeded its budget, terminating"
            );
            let forced_kill = terminate(process.as_mut(), config.kill_grace, &job_id).await;
            Err(TranscodeError::TimedOut {
                job_id,
                timeout_ms: timeout.as_millis() as u64,
                forced_kill,
            })
        }
        Outcome::Shutdown => {
            record_transition(&job_id, job.fail());
            info!(job_id = %job_id, "Pool shutting down, terminating transcode");
            terminate(process.as_mut(), config.kill_grace, &job_id).await;
            Err(TranscodeError::PoolShutdown { job_id })
        }
    }
}

fn wait_failed(job: &mut TranscodeJob, e: ExecutionError) -> TranscodeError {
    let transition = job.fail();
    record_transition(&job.id, transition);
    error!(job_id = %job.id, error = %e, "Waiting on transcode process failed");
    TranscodeError::Supervision {
        job_id: job.id.clone(),
        reason: e.to_string(),
    }
}

/// SIGTERM, wait out the grace window, then SIGKILL and reap.
///
/// Returns true when the forceful kill was needed.
async fn terminate(process: &mut dyn RunningTranscode, grace: Duration, job_id: &str) -> bool {
    if let Err(e) = process.signal(TerminationSignal::Graceful) {
        warn!(job_id = %job_id, error = %e, "Graceful signal failed");
    }

    if tokio::time::timeout(grace, process.wait_exit()).await.is_ok() {
        info!(job_id = %job_id, "Process exited after graceful signal");
        return false;
    }

    warn!(
        job_id = %job_id,
        grace_ms = grace.as_millis() as u64,
        "Process ignored graceful signal, killing"
    );
    if let Err(e) = process.signal(TerminationSignal::Forceful) {
        error!(job_id = %job_id, error = %e, "Forceful kill failed");
    }
    if tokio::time::timeout(REAP_TIMEOUT, process.wait_exit()).await.is_err() {
        error!(job_id = %job_id, "Process still not reaped after forceful kill");
    }
    true
}

fn record_transition(job_id: &str, result: crate::domain::error::Result<()>) {
    if let Err(e) = result {
        warn!(job_id = %job_id, error = %e, "Unexpected job state transition");
    }
}

/// Readable message from a panicked supervisor task
pub(super) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
