// Media Probe Port
//
// Dimension/duration lookup used for logging ahead of a conversion.

use crate::port::ExecutionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Frame size assumed when the probe cannot tell
pub const DEFAULT_PROBE_WIDTH: u32 = 1920;
pub const DEFAULT_PROBE_HEIGHT: u32 = 1080;

/// What the probe learned about a media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: Option<f64>,
    pub codec: Option<String>,
}

impl Default for ProbeInfo {
    fn default() -> Self {
        Self {
            width: DEFAULT_PROBE_WIDTH,
            height: DEFAULT_PROBE_HEIGHT,
            duration_secs: None,
            codec: None,
        }
    }
}

/// Media Probe trait
///
/// Implementations fall back to `ProbeInfo::default()` when the probe
/// executor fails or prints something unparsable. Only a timeout is an error.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeInfo, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Mock probe returning a fixed answer and recording probed paths
    pub struct MockMediaProbe {
        answer: Result<ProbeInfo, ExecutionError>,
        probed: Mutex<Vec<PathBuf>>,
    }

    impl MockMediaProbe {
        pub fn new(info: ProbeInfo) -> Self {
            Self {
                answer: Ok(info),
                probed: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(error: ExecutionError) -> Self {
            Self {
                answer: Err(error),
                probed: Mutex::new(Vec::new()),
            }
        }

        pub fn probed(&self) -> Vec<PathBuf> {
            self.probed.lock().unwrap().clone()
        }
    }

    impl Default for MockMediaProbe {
        fn default() -> Self {
            Self::new(ProbeInfo::default())
        }
    }

    #[async_trait]
    impl MediaProbe for MockMediaProbe {
        async fn probe(&self, path: &Path) -> Result<ProbeInfo, ExecutionError> {
            self.probed.lock().unwrap().push(path.to_path_buf());
            self.answer.clone()
        }
    }
}
