// Transcode Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Job ID (caller chosen, unique among live pool jobs)
pub type JobId = String;

/// Kind of media a job produces; selects encode flags and timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Image,
    Video,
}

impl JobKind {
    /// Output file extension for this kind
    pub fn extension(&self) -> &'static str {
        match self {
            JobKind::Image => "jpg",
            JobKind::Video => "mp4",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Image => write!(f, "image"),
            JobKind::Video => write!(f, "video"),
        }
    }
}

/// Job State
///
/// `Queued -> Running -> {Completed | Failed | TimedOut}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::TimedOut
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => write!(f, "QUEUED"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

/// Transcode Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub id: JobId,
    pub kind: JobKind,
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub watermark: bool,
    pub state: JobState,
}

impl TranscodeJob {
    /// Create a new queued job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (used for logging and signalling)
    /// * `kind` - Image or video
    /// * `input` - Staged input file
    /// * `output` - Output file the executor writes
    /// * `width` / `height` - Target frame size in pixels
    pub fn new(
        id: impl Into<String>,
        kind: JobKind,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            input: input.into(),
            output: output.into(),
            width,
            height,
            watermark: false,
            state: JobState::Queued,
        }
    }

    pub fn with_watermark(mut self, watermark: bool) -> Self {
        self.watermark = watermark;
        self
    }

    /// Reject jobs the executor could never run
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "job id cannot be empty".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(DomainError::ValidationError(format!(
                "job {}: target size {}x{} must be non-zero",
                self.id, self.width, self.height
            )));
        }
        if self.input.as_os_str().is_empty() || self.output.as_os_str().is_empty() {
            return Err(DomainError::ValidationError(format!(
                "job {}: input and output paths are required",
                self.id
            )));
        }
        Ok(())
    }

    /// Transition to Running
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobState::Queued, JobState::Running)
    }

    /// Transition to Completed
    pub fn complete(&mut self) -> Result<()> {
        self.transition(JobState::Running, JobState::Completed)
    }

    /// Transition to Failed
    pub fn fail(&mut self) -> Result<()> {
        self.transition(JobState::Running, JobState::Failed)
    }

    /// Transition to TimedOut
    pub fn time_out(&mut self) -> Result<()> {
        self.transition(JobState::Running, JobState::TimedOut)
    }

    fn transition(&mut self, from: JobState, to: JobState) -> Result<()> {
        if self.state != from {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Keep only the last `max_chars` characters of diagnostic output.
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    text.chars().skip(total - max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TranscodeJob {
        TranscodeJob::new("job-1", JobKind::Video, "/tmp/in.mov", "/tmp/out.mp4", 1080, 1920)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job();
        assert_eq!(job.state, JobState::Queued);
        job.start().unwrap();
        assert_eq!(job.state, JobState::Running);
        job.complete().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job();
        job.start().unwrap();
        job.time_out().unwrap();

        let err = job.fail().unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                from: "TIMED_OUT".to_string(),
                to: "FAILED".to_string(),
            }
        );
        assert!(job.complete().is_err());
        assert_eq!(job.state, JobState::TimedOut);
    }

    #[test]
    fn test_cannot_complete_before_start() {
        let mut job = job();
        assert!(job.complete().is_err());
        assert_eq!(job.state, JobState::Queued);
    }

    #[test]
    fn test_validate() {
        assert!(job().validate().is_ok());

        let mut zero = job();
        zero.width = 0;
        assert!(zero.validate().is_err());

        let mut nameless = job();
        nameless.id = String::new();
        assert!(nameless.validate().is_err());
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("short", 10), "short");
        assert_eq!(tail_chars("abcdefgh", 3), "fgh");
        // Counted in characters, not bytes
        assert_eq!(tail_chars("ééééé", 2), "éé");
        assert_eq!(tail_chars("anything", 0), "");
    }
}
