// Application constants (no magic values)
use std::time::Duration;

/// Rolling window of admission wait samples (last 100 promotions)
pub const WAIT_WINDOW_CAPACITY: usize = 100;

/// Per-job budget for image transcodes (30s)
pub const IMAGE_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-job budget for video transcodes (3 minutes)
pub const VIDEO_JOB_TIMEOUT: Duration = Duration::from_secs(180);

/// Delay between SIGTERM and SIGKILL for a timed-out job (5s)
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Upper bound on reaping a process after SIGKILL
pub const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Characters of executor stderr carried in a failure
pub const DIAGNOSTIC_TAIL_CHARS: usize = 500;

/// Concurrent executor processes when FFMPEG_CONCURRENCY is unset
pub const DEFAULT_POOL_CONCURRENCY: usize = 2;

/// Budget for one media probe (10s)
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Period of the status reporter (30s)
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(30);
