// Port Layer - Interfaces for external dependencies

pub mod media_probe;
pub mod transcode_launcher;

// Re-exports
pub use media_probe::{MediaProbe, ProbeInfo};
pub use transcode_launcher::{
    ExecutionError, ExitReport, Invocation, RunningTranscode, TerminationSignal,
    TranscodeLauncher,
};
