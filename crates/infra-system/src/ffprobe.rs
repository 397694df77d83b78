// ffprobe media probe
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use ffgate_core::application::constants::PROBE_TIMEOUT;
use ffgate_core::port::{ExecutionError, MediaProbe, ProbeInfo};

use crate::process_launcher::ExecutorCommand;

const PROBE_ARGS: [&str; 6] = [
    "-v",
    "quiet",
    "-print_format",
    "json",
    "-show_streams",
    "-show_format",
];

#[derive(Debug, Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    // ffprobe prints the duration as a string
    duration: Option<String>,
}

/// Extract dimensions, duration and codec from `ffprobe -print_format json`
///
/// Dimensions come from the first video stream and default to 1920x1080.
pub fn parse_probe_output(stdout: &[u8]) -> Result<ProbeInfo, serde_json::Error> {
    let document: ProbeDocument = serde_json::from_slice(stdout)?;
    let mut info = ProbeInfo::default();

    if let Some(video) = document
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    {
        if let Some(width) = video.width.filter(|w| *w > 0) {
            info.width = width;
        }
        if let Some(height) = video.height.filter(|h| *h > 0) {
            info.height = height;
        }
        info.codec = video.codec_name.clone();
    }

    info.duration_secs = document
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok());

    Ok(info)
}

/// MediaProbe backed by the ffprobe binary
pub struct FfprobeProbe {
    command: ExecutorCommand,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(command: ExecutorCommand) -> Self {
        Self {
            command,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeInfo, ExecutionError> {
        let mut command = self.command.command();
        command
            .args(PROBE_ARGS)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "ffprobe could not be run, using defaults"
                );
                return Ok(ProbeInfo::default());
            }
            Err(_) => {
                warn!(
                    path = %path.display(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "ffprobe timed out"
                );
                return Err(ExecutionError::Timeout(self.timeout.as_millis() as u64));
            }
        };

        if !output.status.success() {
            warn!(
                path = %path.display(),
                exit_code = ?output.status.code(),
                "ffprobe failed, using defaults"
            );
            return Ok(ProbeInfo::default());
        }

        match parse_probe_output(&output.stdout) {
            Ok(info) => {
                debug!(
                    path = %path.display(),
                    width = info.width,
                    height = info.height,
                    duration_secs = ?info.duration_secs,
                    codec = ?info.codec,
                    "Probed media"
                );
                Ok(info)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Unparsable ffprobe output, using defaults"
                );
                Ok(ProbeInfo::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "aac"},
            {"index": 1, "codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720}
        ],
        "format": {"filename": "clip.mp4", "duration": "12.480000"}
    }"#;

    #[test]
    fn test_parse_first_video_stream() {
        let info = parse_probe_output(SAMPLE.as_bytes()).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.codec.as_deref(), Some("h264"));
        assert_eq!(info.duration_secs, Some(12.48));
    }

    #[test]
    fn test_parse_without_video_stream_uses_defaults() {
        let info = parse_probe_output(br#"{"streams": [], "format": {}}"#).unwrap();
        assert_eq!(info, ProbeInfo::default());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_reads_executor_stdout() {
        let script = r#"echo '{"streams":[{"codec_type":"video","width":640,"height":360}]}'"#;
        let probe = FfprobeProbe::new(
            ExecutorCommand::new("/bin/sh").with_leading_args(["-c", script, "ffprobe"]),
        );
        let info = probe.probe(Path::new("/tmp/any.mp4")).await.unwrap();
        assert_eq!((info.width, info.height), (640, 360));
        assert_eq!(info.duration_secs, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_failure_falls_back_to_defaults() {
        let probe = FfprobeProbe::new(ExecutorCommand::new("/nonexistent/ffprobe"));
        let info = probe.probe(Path::new("/tmp/any.mp4")).await.unwrap();
        assert_eq!(info, ProbeInfo::default());

        let failing = FfprobeProbe::new(
            ExecutorCommand::new("/bin/sh").with_leading_args(["-c", "exit 1", "ffprobe"]),
        );
        assert_eq!(
            failing.probe(Path::new("/tmp/any.mp4")).await.unwrap(),
            ProbeInfo::default()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_timeout_is_an_error() {
        let probe = FfprobeProbe::new(
            ExecutorCommand::new("/bin/sh").with_leading_args(["-c", "exec sleep 5", "ffprobe"]),
        )
        .with_timeout(Duration::from_millis(100));

        let err = probe.probe(Path::new("/tmp/any.mp4")).await.unwrap_err();
        assert_eq!(err, ExecutionError::Timeout(100));
    }
}
