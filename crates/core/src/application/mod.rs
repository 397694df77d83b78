// Application Layer - Use Cases and Business Logic

pub mod admission;
pub mod aggregator;
pub mod constants;
pub mod conversion;
pub mod shutdown;
pub mod status_reporter;
pub mod transcode_pool;

// Re-exports
pub use admission::{AdmissionGate, AdmissionPermit};
pub use aggregator::{AggregateStatus, QueueAggregator};
pub use conversion::{
    ConversionOutcome, ConversionRequest, ConversionService, FormatFailure, FormatOutput,
};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use status_reporter::{StatusReporter, SystemStatus};
pub use transcode_pool::{Corner, PoolConfig, PoolStatus, TranscodePool, WatermarkSpec};
