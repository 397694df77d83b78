// Domain Layer - Pure business logic and entities

pub mod error;
pub mod format;
pub mod job;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use format::AspectFormat;
pub use job::{tail_chars, JobId, JobKind, JobState, TranscodeJob};
pub use queue::{
    estimate_wait_secs, Health, HealthPolicy, QueueConfig, QueueId, QueueSettings, QueueStats,
    QueueStatus, ServerLoad, DOWNLOAD_QUEUE, IMAGE_QUEUE, PROCESSING_QUEUE,
};
