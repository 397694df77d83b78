// Central Error Types
//
// Admission and transcode failures are expected, user-facing conditions;
// every variant carries enough context for a "try again in N seconds" reply.

use thiserror::Error;

/// Failure to obtain a slot from an admission gate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Server is busy: queue '{queue}' already holds {queued} waiting requests. Please try again in ~{retry_after_secs}s")]
    QueueSaturated {
        queue: String,
        queued: usize,
        retry_after_secs: u64,
    },

    #[error("Request {request_id} queued in '{queue}' for {waited_ms}ms without a free slot. Please try again in ~{retry_after_secs}s")]
    AdmissionTimedOut {
        queue: String,
        request_id: String,
        waited_ms: u64,
        retry_after_secs: u64,
    },
}

impl AdmissionError {
    /// Suggested back-off before the caller retries
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            AdmissionError::QueueSaturated {
                retry_after_secs, ..
            }
            | AdmissionError::AdmissionTimedOut {
                retry_after_secs, ..
            } => *retry_after_secs,
        }
    }
}

/// Failure of a job submitted to the transcode pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    #[error("Transcode job {job_id} exceeded its {timeout_ms}ms budget and was terminated")]
    TimedOut {
        job_id: String,
        timeout_ms: u64,
        /// True when the graceful signal was ignored and SIGKILL was needed
        forced_kill: bool,
    },

    #[error("Transcode job {job_id} failed (exit code {exit_code:?}): {diagnostics}")]
    Failed {
        job_id: String,
        exit_code: Option<i32>,
        /// Bounded tail of the executor's stderr
        diagnostics: String,
    },

    #[error("Transcode executor unavailable for job {job_id}: {reason}")]
    ExecutorUnavailable { job_id: String, reason: String },

    #[error("Transcode pool is shutting down; job {job_id} was not completed")]
    PoolShutdown { job_id: String },

    #[error("Supervision of job {job_id} failed: {reason}")]
    Supervision { job_id: String, reason: String },

    #[error("Invalid transcode job: {0}")]
    InvalidJob(String),
}

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("Execution error: {0}")]
    Execution(#[from] crate::port::ExecutionError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    #[error("Processing failed for all formats of request {request_id}: {failures}")]
    AllFormatsFailed { request_id: String, failures: String },
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
