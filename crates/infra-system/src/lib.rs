// ffgate Infrastructure - System Adapters
// Implements: TranscodeLauncher, MediaProbe

pub mod ffprobe;
pub mod process_launcher;
mod stderr_tail;

pub use ffprobe::{parse_probe_output, FfprobeProbe};
pub use process_launcher::{ExecutorCommand, ProcessLauncher};
