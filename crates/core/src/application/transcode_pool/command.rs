// Executor argument construction (pure)

use crate::domain::{JobKind, TranscodeJob};
use serde::{Deserialize, Serialize};

const DEFAULT_WATERMARK_TEXT: &str = "[RACIO]";
const DEFAULT_WATERMARK_FONT_SIZE: u32 = 18;
const DEFAULT_WATERMARK_OPACITY: f64 = 0.6;
const DEFAULT_WATERMARK_MARGIN: u32 = 12;

/// Corner the watermark is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// drawtext overlay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    pub text: String,
    pub font_size: u32,
    pub opacity: f64,
    pub corner: Corner,
    pub margin: u32,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            text: DEFAULT_WATERMARK_TEXT.to_string(),
            font_size: DEFAULT_WATERMARK_FONT_SIZE,
            opacity: DEFAULT_WATERMARK_OPACITY,
            corner: Corner::BottomRight,
            margin: DEFAULT_WATERMARK_MARGIN,
        }
    }
}

impl WatermarkSpec {
    fn position(&self) -> (String, String) {
        let m = self.margin;
        match self.corner {
            Corner::TopLeft => (m.to_string(), m.to_string()),
            Corner::TopRight => (format!("w-tw-{m}"), m.to_string()),
            Corner::BottomLeft => (m.to_string(), format!("h-th-{m}")),
            Corner::BottomRight => (format!("w-tw-{m}"), format!("h-th-{m}")),
        }
    }

    fn drawtext(&self) -> String {
        let (x, y) = self.position();
        format!(
            "drawtext=text='{}':fontsize={}:fontcolor=white@{}:x={}:y={}:shadowcolor=black@0.4:shadowx=1:shadowy=1",
            escape_drawtext(&self.text),
            self.font_size,
            self.opacity,
            x,
            y
        )
    }
}

/// Make overlay text safe inside a single-quoted filtergraph value
pub fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ':' => escaped.push_str("\\:"),
            '%' => escaped.push_str("\\%"),
            '\'' => escaped.push_str("'\\''"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Letterbox into a fixed frame, optionally followed by the watermark
pub fn build_filter_chain(
    width: u32,
    height: u32,
    watermark: Option<&WatermarkSpec>,
) -> String {
    let mut chain = format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black",
        w = width,
        h = height
    );
    if let Some(spec) = watermark {
        chain.push(',');
        chain.push_str(&spec.drawtext());
    }
    chain
}

/// Full argument list for one job (program name excluded)
pub fn build_args(job: &TranscodeJob, watermark: &WatermarkSpec) -> Vec<String> {
    let chain = build_filter_chain(job.width, job.height, job.watermark.then_some(watermark));

    let mut args = vec![
        "-i".to_string(),
        job.input.to_string_lossy().into_owned(),
        "-vf".to_string(),
        chain,
    ];

    let encode: &[&str] = match job.kind {
        JobKind::Image => &["-y", "-q:v", "2"],
        JobKind::Video => &[
            "-preset",
            "ultrafast",
            "-crf",
            "23",
            "-movflags",
            "+faststart",
            "-threads",
            "0",
            "-c:v",
            "libx264",
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            "-y",
        ],
    };
    args.extend(encode.iter().map(|s| s.to_string()));
    args.push(job.output.to_string_lossy().into_owned());
    args
}
