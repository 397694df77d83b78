//! End-to-end conversion through the daemon's wiring
//!
//! The executor is a shell script that writes its last argument (the output
//! path), so outputs really land on disk.
#![cfg(unix)]

use ffgate_core::application::ConversionRequest;
use ffgate_core::domain::{AspectFormat, JobKind, IMAGE_QUEUE, PROCESSING_QUEUE};
use ffgate_core::{AdmissionError, AppError};
use ffgate_daemon::{App, Settings};
use ffgate_infra_system::{ExecutorCommand, FfprobeProbe, ProcessLauncher};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const WRITE_OUTPUT: &str = r#"for last; do :; done
case "$last" in
  *square*) echo "Invalid frame dimensions" >&2; exit 1 ;;
esac
echo encoded > "$last""#;

const PROBE_JSON: &str = r#"echo '{"streams":[{"codec_type":"video","codec_name":"h264","width":1280,"height":720}],"format":{"duration":"4.5"}}'"#;

fn app(script: &str, pairs: &[(&str, &str)]) -> App {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let settings = Settings::from_lookup(|key| vars.get(key).cloned()).unwrap();

    let launcher = ProcessLauncher::new(
        ExecutorCommand::new("/bin/sh").with_leading_args(["-c", script, "ffmpeg"]),
    );
    let probe = FfprobeProbe::new(
        ExecutorCommand::new("/bin/sh").with_leading_args(["-c", PROBE_JSON, "ffprobe"]),
    );
    App::with_adapters(&settings, Arc::new(launcher), Arc::new(probe)).unwrap()
}

#[tokio::test]
async fn test_image_conversion_writes_every_format() {
    let app = app(WRITE_OUTPUT, &[]);
    let out = TempDir::new().unwrap();

    let request = ConversionRequest::new(
        "upload-1",
        JobKind::Image,
        "/staging/upload-1.png",
        out.path(),
        vec![AspectFormat::Vertical, AspectFormat::Landscape],
    )
    .with_watermark(true);

    let outcome = app.conversion().convert(request).await.unwrap();

    assert_eq!(outcome.outputs.len(), 2);
    assert!(outcome.failures.is_empty());
    assert_eq!((outcome.source.width, outcome.source.height), (1280, 720));
    assert_eq!(outcome.source.duration_secs, Some(4.5));
    for output in &outcome.outputs {
        assert!(output.path.starts_with(out.path()));
        assert_eq!(std::fs::read_to_string(&output.path).unwrap().trim(), "encoded");
    }
    assert!(out.path().join("vertical_9-16.jpg").exists());

    let image = app.aggregator().gate(IMAGE_QUEUE).unwrap().stats();
    assert_eq!(image.total_processed, 1);
    assert_eq!(image.active, 0);
}

#[tokio::test]
async fn test_video_conversion_reports_partial_failure() {
    let app = app(WRITE_OUTPUT, &[]);
    let out = TempDir::new().unwrap();

    let request = ConversionRequest::new(
        "upload-2",
        JobKind::Video,
        "/staging/upload-2.mov",
        out.path(),
        vec![AspectFormat::Square, AspectFormat::Portrait],
    );

    let outcome = app.conversion().convert(request).await.unwrap();

    assert_eq!(outcome.outputs.len(), 1);
    assert_eq!(outcome.outputs[0].path, out.path().join("portrait_4-5.mp4"));
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].error.contains("Invalid frame dimensions"));
    assert!(!out.path().join("square_1-1.mp4").exists());

    let processing = app.aggregator().gate(PROCESSING_QUEUE).unwrap().stats();
    assert_eq!(processing.total_processed, 1);
}

#[tokio::test]
async fn test_every_format_failing_is_an_error() {
    let app = app("echo 'Unknown encoder' >&2; exit 1", &[]);
    let out = TempDir::new().unwrap();

    let request = ConversionRequest::new(
        "upload-3",
        JobKind::Image,
        "/staging/upload-3.png",
        out.path(),
        vec![AspectFormat::Square],
    );

    match app.conversion().convert(request).await.unwrap_err() {
        AppError::AllFormatsFailed {
            request_id,
            failures,
        } => {
            assert_eq!(request_id, "upload-3");
            assert!(failures.contains("Unknown encoder"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(app.aggregator().gate(IMAGE_QUEUE).unwrap().stats().active, 0);
}

#[tokio::test]
async fn test_saturated_processing_queue_rejects_immediately() {
    let app = app(
        "sleep 0.5",
        &[
            ("QUEUE_PROCESSING_CONCURRENCY", "1"),
            ("QUEUE_PROCESSING_MAX_SIZE", "1"),
        ],
    );
    let out = TempDir::new().unwrap();

    let request = |id: &str| {
        ConversionRequest::new(
            id,
            JobKind::Video,
            "/staging/clip.mov",
            out.path(),
            vec![AspectFormat::Square],
        )
    };

    let conversion = Arc::clone(app.conversion());
    let first = {
        let conversion = Arc::clone(&conversion);
        let req = request("first");
        tokio::spawn(async move { conversion.convert(req).await })
    };
    let second = {
        let conversion = Arc::clone(&conversion);
        let req = request("second");
        tokio::spawn(async move { conversion.convert(req).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let gate = app.aggregator().gate(PROCESSING_QUEUE).unwrap();
    assert_eq!(gate.position("second"), Some(1));
    assert!(!app.aggregator().can_accept_requests());

    let err = conversion.convert(request("third")).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Admission(AdmissionError::QueueSaturated { queued: 1, .. })
    ));

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(gate.stats().total_processed, 2);
}

#[tokio::test]
async fn test_shutdown_rejects_later_conversions() {
    let app = app(WRITE_OUTPUT, &[]);
    app.shutdown().await;

    let out = TempDir::new().unwrap();
    let request = ConversionRequest::new(
        "after-shutdown",
        JobKind::Image,
        "/staging/late.png",
        out.path(),
        vec![AspectFormat::Portrait],
    );
    assert!(matches!(
        app.conversion().convert(request).await,
        Err(AppError::AllFormatsFailed { .. })
    ));
}
