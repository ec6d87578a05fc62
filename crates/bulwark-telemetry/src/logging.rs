//! Logging configuration and setup.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync + 'static>;

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-friendly.
    Pretty,
    /// Single line per event.
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
    /// The default `tracing-subscriber` format.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::ConfigError(format!("unknown log format '{other}'"))),
        }
    }
}

/// Log output target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to stdout.
    Stdout,
    /// Log to stderr.
    #[default]
    Stderr,
    /// Log to daily-rotated files in this directory.
    File(PathBuf),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Where events go.
    pub target: LogTarget,
    /// File name prefix for [`LogTarget::File`].
    pub file_prefix: String,
    /// Per-target directives (e.g. `bulwark_vfs=debug`).
    pub directives: Vec<String>,
    /// Include timestamps.
    pub timestamps: bool,
    /// Use ANSI colors.
    pub ansi: bool,
    /// Include source file and line.
    pub file_info: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            file_prefix: "bulwark".to_owned(),
            directives: Vec::new(),
            timestamps: true,
            ansi: true,
            file_info: false,
        }
    }
}

impl LogConfig {
    /// Create a config with the given level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Set the format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Log to daily-rotated files `{prefix}.YYYY-MM-DD` in `directory`.
    /// Colors are turned off.
    #[must_use]
    pub fn with_file_logging(mut self, directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.target = LogTarget::File(directory.into());
        self.file_prefix = prefix.into();
        self.ansi = false;
        self
    }

    /// Add a directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Drop timestamps.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Drop colors.
    #[must_use]
    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }

    /// Include source file and line.
    #[must_use]
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level).map_err(|e| TelemetryError::ConfigError(e.to_string()))?;
        for directive in &self.directives {
            let directive = directive
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| TelemetryError::ConfigError(e.to_string()))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }

    fn layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_file(self.file_info)
            .with_line_number(self.file_info);

        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
            (LogFormat::Pretty, true) => base.pretty().with_ansi(self.ansi).boxed(),
            (LogFormat::Pretty, false) => base.pretty().with_ansi(self.ansi).without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().with_ansi(self.ansi).boxed(),
            (LogFormat::Compact, false) => base.compact().with_ansi(self.ansi).without_time().boxed(),
            (LogFormat::Full, true) => base.with_ansi(self.ansi).boxed(),
            (LogFormat::Full, false) => base.with_ansi(self.ansi).without_time().boxed(),
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::ConfigError`] for bad directives or an unusable
/// log directory, and [`TelemetryError::InitError`] if a global subscriber is
/// already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;

    let layer = match &config.target {
        LogTarget::Stdout => config.layer(std::io::stdout),
        LogTarget::Stderr => config.layer(std::io::stderr),
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| TelemetryError::ConfigError(format!("failed to create log directory: {e}")))?;
            config.layer(RollingFileAppender::new(Rotation::DAILY, dir, &config.file_prefix))
        },
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}

/// Install the default subscriber (info, stderr, compact).
///
/// # Errors
///
/// See [`setup_logging`].
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.target, LogTarget::Stderr);
        assert!(config.timestamps);
    }

    #[test]
    fn test_builder() {
        let dir = PathBuf::from("/var/log/bulwark");
        let config = LogConfig::new("debug")
            .with_format(LogFormat::Json)
            .with_file_logging(&dir, "worker")
            .with_directive("bulwark_vfs=trace")
            .without_timestamps();
        assert_eq!(config.target, LogTarget::File(dir));
        assert_eq!(config.file_prefix, "worker");
        assert!(!config.ansi);
        assert!(!config.timestamps);
        assert_eq!(config.directives, vec!["bulwark_vfs=trace"]);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let config = LogConfig::new("warn").with_format(LogFormat::Full);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["format"], "full");
        let parsed: LogConfig = serde_json::from_value(serde_json::json!({"level": "error"})).unwrap();
        assert_eq!(parsed.level, "error");
        assert_eq!(parsed.file_prefix, "bulwark");
    }

    #[test]
    fn test_filter_directives() {
        assert!(LogConfig::new("debug").with_directive("bulwark=trace").build_filter().is_ok());
        assert!(
            LogConfig::new("debug")
                .with_directive("[invalid=syntax")
                .build_filter()
                .is_err()
        );
    }

    #[test]
    fn test_file_target_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs");
        let config = LogConfig::new("info").with_file_logging(&dir, "test");
        // A second global init in the same process fails; the directory is
        // created either way.
        let _ = setup_logging(&config);
        assert!(dir.is_dir());
    }
}
