// Conversion Service - one upload, many aspect formats
//
// Admission is taken once per request; the formats then run through the
// transcode pool one after another under that single permit.

use crate::application::aggregator::QueueAggregator;
use crate::application::transcode_pool::TranscodePool;
use crate::domain::{AspectFormat, JobKind, TranscodeJob, IMAGE_QUEUE, PROCESSING_QUEUE};
use crate::error::{AppError, Result};
use crate::port::{MediaProbe, ProbeInfo};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// One conversion request
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub request_id: String,
    pub kind: JobKind,
    /// Staged input file
    pub input: PathBuf,
    /// Directory the outputs are written into
    pub output_dir: PathBuf,
    pub formats: Vec<AspectFormat>,
    pub watermark: bool,
    /// Admission wait override; the gate default applies when `None`
    pub admission_timeout: Option<Duration>,
}

impl ConversionRequest {
    pub fn new(
        request_id: impl Into<String>,
        kind: JobKind,
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        formats: Vec<AspectFormat>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            kind,
            input: input.into(),
            output_dir: output_dir.into(),
            formats,
            watermark: false,
            admission_timeout: None,
        }
    }

    pub fn with_watermark(mut self, watermark: bool) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatOutput {
    pub format: AspectFormat,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatFailure {
    pub format: AspectFormat,
    pub error: String,
}

/// Result of a request where at least one format succeeded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionOutcome {
    pub request_id: String,
    pub kind: JobKind,
    pub source: ProbeInfo,
    pub outputs: Vec<FormatOutput>,
    pub failures: Vec<FormatFailure>,
    pub waited_ms: u64,
    pub elapsed_ms: u64,
}

pub struct ConversionService {
    aggregator: Arc<QueueAggregator>,
    pool: TranscodePool,
    probe: Arc<dyn MediaProbe>,
}

impl ConversionService {
    pub fn new(
        aggregator: Arc<QueueAggregator>,
        pool: TranscodePool,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        Self {
            aggregator,
            pool,
            probe,
        }
    }

    /// Gate a request of this kind is admitted through
    pub fn queue_for(kind: JobKind) -> &'static str {
        match kind {
            JobKind::Image => IMAGE_QUEUE,
            JobKind::Video => PROCESSING_QUEUE,
        }
    }

    /// Convert one input into every requested format
    ///
    /// # Errors
    /// - AppError::Validation for an empty format list
    /// - AppError::UnknownQueue if the aggregator lacks the gate for this kind
    /// - AppError::Admission when the gate is saturated or the wait times out
    /// - AppError::AllFormatsFailed when no format could be produced
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionOutcome> {
        let formats = dedupe(&request.formats);
        if formats.is_empty() {
            return Err(AppError::Validation(format!(
                "request {}: at least one format is required",
                request.request_id
            )));
        }

        let queue = Self::queue_for(request.kind);
        let gate = self
            .aggregator
            .gate(queue)
            .ok_or_else(|| AppError::UnknownQueue(queue.to_string()))?;

        let permit = gate
            .acquire(&request.request_id, request.admission_timeout)
            .await?;
        let started = Instant::now();

        let source = match self.probe.probe(&request.input).await {
            Ok(info) => info,
            Err(e) => {
                warn!(
                    request_id = %request.request_id,
                    error = %e,
                    "Media probe failed, assuming default dimensions"
                );
                ProbeInfo::default()
            }
        };
        info!(
            request_id = %request.request_id,
            queue = %queue,
            kind = %request.kind,
            width = source.width,
            height = source.height,
            duration_secs = ?source.duration_secs,
            formats = formats.len(),
            "Conversion started"
        );

        let mut outputs = Vec::new();
        let mut failures = Vec::new();
        for format in formats {
            let (width, height) = format.dimensions();
            let job = TranscodeJob::new(
                format!("{}-{}", request.request_id, format.name()),
                request.kind,
                request.input.clone(),
                request
                    .output_dir
                    .join(format!("{}.{}", format.name(), request.kind.extension())),
                width,
                height,
            )
            .with_watermark(request.watermark);

            match self.pool.submit(job).await {
                Ok(path) => outputs.push(FormatOutput { format, path }),
                Err(e) => {
                    warn!(
                        request_id = %request.request_id,
                        format = %format,
                        error = %e,
                        "Format conversion failed"
                    );
                    failures.push(FormatFailure {
                        format,
                        error: e.to_string(),
                    });
                }
            }
        }

        let waited_ms = permit.waited().as_millis() as u64;
        permit.release();

        if outputs.is_empty() {
            let joined = failures
                .iter()
                .map(|f| format!("{}: {}", f.format, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AppError::AllFormatsFailed {
                request_id: request.request_id,
                failures: joined,
            });
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            request_id = %request.request_id,
            succeeded = outputs.len(),
            failed = failures.len(),
            elapsed_ms,
            "Conversion finished"
        );

        Ok(ConversionOutcome {
            request_id: request.request_id,
            kind: request.kind,
            source,
            outputs,
            failures,
            waited_ms,
            elapsed_ms,
        })
    }
}

fn dedupe(formats: &[AspectFormat]) -> Vec<AspectFormat> {
    let mut unique = Vec::with_capacity(formats.len());
    for format in formats {
        if !unique.contains(format) {
            unique.push(*format);
        }
    }
    unique
}
