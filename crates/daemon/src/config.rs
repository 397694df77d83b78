// Daemon configuration (environment variables, read once at startup)

use anyhow::{bail, Context, Result};
use ffgate_core::application::constants::DEFAULT_STATUS_INTERVAL;
use ffgate_core::application::PoolConfig;
use ffgate_core::domain::QueueSettings;
use ffgate_infra_system::ExecutorCommand;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_FFPROBE: &str = "ffprobe";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Production: one JSON object per line
    Json,
    /// Development: human readable
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("expected 'json' or 'pretty', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Daily-rolling log files go here instead of stdout when set
    pub dir: Option<PathBuf>,
}

/// Everything the daemon needs to wire itself up
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub queues: QueueSettings,
    pub pool: PoolConfig,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Whitespace-separated command the executor runs under (e.g. `nice -n 10`)
    pub ffmpeg_wrapper: Option<String>,
    pub status_interval: Duration,
    pub log: LogSettings,
}

impl Settings {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source; unset keys take their defaults
    ///
    /// # Errors
    /// Malformed numbers, unknown log formats and unusable queue or pool
    /// values are startup errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = QueueSettings::default();
        let queues = QueueSettings {
            processing_max_concurrent: parse_or(
                &lookup,
                "QUEUE_PROCESSING_CONCURRENCY",
                defaults.processing_max_concurrent,
            )?,
            processing_max_queue_size: parse_or(
                &lookup,
                "QUEUE_PROCESSING_MAX_SIZE",
                defaults.processing_max_queue_size,
            )?,
            processing_timeout: millis_or(
                &lookup,
                "QUEUE_PROCESSING_TIMEOUT",
                defaults.processing_timeout,
            )?,
            download_max_concurrent: parse_or(
                &lookup,
                "QUEUE_DOWNLOAD_CONCURRENCY",
                defaults.download_max_concurrent,
            )?,
            download_max_queue_size: parse_or(
                &lookup,
                "QUEUE_DOWNLOAD_MAX_SIZE",
                defaults.download_max_queue_size,
            )?,
            download_timeout: millis_or(
                &lookup,
                "QUEUE_DOWNLOAD_TIMEOUT",
                defaults.download_timeout,
            )?,
        };

        let pool_defaults = PoolConfig::default();
        let pool = PoolConfig::new(parse_or(
            &lookup,
            "FFMPEG_CONCURRENCY",
            pool_defaults.max_concurrent,
        )?);

        let status_interval = Duration::from_secs(parse_or(
            &lookup,
            "FFGATE_STATUS_INTERVAL_SECS",
            DEFAULT_STATUS_INTERVAL.as_secs(),
        )?);
        if status_interval.is_zero() {
            bail!("FFGATE_STATUS_INTERVAL_SECS must be at least 1");
        }

        let log = LogSettings {
            format: match non_empty(&lookup, "FFGATE_LOG_FORMAT") {
                Some(raw) => raw
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))
                    .context("invalid FFGATE_LOG_FORMAT")?,
                None => LogFormat::Pretty,
            },
            dir: non_empty(&lookup, "FFGATE_LOG_DIR").map(PathBuf::from),
        };

        let settings = Self {
            queues,
            pool,
            ffmpeg_path: non_empty(&lookup, "FFMPEG_PATH")
                .unwrap_or_else(|| DEFAULT_FFMPEG.to_string())
                .into(),
            ffprobe_path: non_empty(&lookup, "FFPROBE_PATH")
                .unwrap_or_else(|| DEFAULT_FFPROBE.to_string())
                .into(),
            ffmpeg_wrapper: non_empty(&lookup, "FFMPEG_WRAPPER"),
            status_interval,
            log,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the gates and the pool would refuse later
    pub fn validate(&self) -> Result<()> {
        let image = self
            .queues
            .image()
            .context("invalid settings for queue 'image'")?;
        for config in [self.queues.processing(), self.queues.download(), image] {
            config
                .validate()
                .with_context(|| format!("invalid settings for queue '{}'", config.name))?;
        }
        self.pool.validate().context("invalid transcode pool settings")?;
        Ok(())
    }

    /// Executor command line prefix, wrapper included
    pub fn ffmpeg_command(&self) -> ExecutorCommand {
        match &self.ffmpeg_wrapper {
            Some(wrapper) => ExecutorCommand::wrapped(wrapper, &self.ffmpeg_path),
            None => ExecutorCommand::new(&self.ffmpeg_path),
        }
    }

    pub fn ffprobe_command(&self) -> ExecutorCommand {
        ExecutorCommand::new(&self.ffprobe_path)
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {}='{}'", key, raw)),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = default.as_millis() as u64;
    parse_or(lookup, key, default_ms).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.queues, QueueSettings::default());
        assert_eq!(settings.pool.max_concurrent, 2);
        assert_eq!(settings.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(settings.status_interval, Duration::from_secs(30));
        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert_eq!(settings.log.dir, None);
        assert_eq!(settings.ffmpeg_command(), ExecutorCommand::new("ffmpeg"));
    }

    #[test]
    fn test_overrides() {
        let settings = settings_from(&[
            ("QUEUE_PROCESSING_CONCURRENCY", "4"),
            ("QUEUE_PROCESSING_MAX_SIZE", "10"),
            ("QUEUE_PROCESSING_TIMEOUT", "90000"),
            ("QUEUE_DOWNLOAD_TIMEOUT", "1500"),
            ("FFMPEG_CONCURRENCY", "3"),
            ("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
            ("FFMPEG_WRAPPER", "nice -n 10"),
            ("FFGATE_LOG_FORMAT", "JSON"),
            ("FFGATE_LOG_DIR", "/var/log/ffgate"),
        ])
        .unwrap();

        assert_eq!(settings.queues.processing_max_concurrent, 4);
        let image = settings.queues.image().unwrap();
        assert_eq!(image.max_concurrent, 8);
        assert_eq!(image.max_queue_size, 20);
        assert_eq!(settings.queues.processing_timeout, Duration::from_secs(90));
        assert_eq!(settings.queues.download_timeout, Duration::from_millis(1500));
        assert_eq!(settings.pool.max_concurrent, 3);
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(settings.log.dir, Some(PathBuf::from("/var/log/ffgate")));

        let command = settings.ffmpeg_command();
        assert_eq!(command.program(), std::path::Path::new("nice"));
        assert_eq!(command.leading_args(), ["-n", "10", "/opt/ffmpeg/bin/ffmpeg"]);
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let settings = settings_from(&[("FFMPEG_PATH", "  "), ("FFMPEG_WRAPPER", "")]).unwrap();
        assert_eq!(settings.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(settings.ffmpeg_wrapper, None);
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        let err = settings_from(&[("QUEUE_PROCESSING_CONCURRENCY", "two")]).unwrap_err();
        assert!(format!("{:#}", err).contains("QUEUE_PROCESSING_CONCURRENCY"));

        assert!(settings_from(&[("FFGATE_LOG_FORMAT", "xml")]).is_err());
        assert!(settings_from(&[("FFMPEG_CONCURRENCY", "0")]).is_err());
        assert!(settings_from(&[("QUEUE_DOWNLOAD_MAX_SIZE", "0")]).is_err());
        assert!(settings_from(&[("FFGATE_STATUS_INTERVAL_SECS", "0")]).is_err());
    }

    #[test]
    fn test_oversized_processing_values_are_rejected() {
        let huge = usize::MAX.to_string();
        for key in ["QUEUE_PROCESSING_MAX_SIZE", "QUEUE_PROCESSING_CONCURRENCY"] {
            let err = settings_from(&[(key, huge.as_str())]).unwrap_err();
            assert!(format!("{:#}", err).contains("image"), "{key}: {err:#}");
        }
    }
}
