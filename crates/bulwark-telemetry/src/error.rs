use thiserror::Error;

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configuration is invalid (bad filter directive, unknown format,
    /// unusable log directory).
    #[error("Invalid logging configuration: {0}")]
    ConfigError(String),

    /// A global subscriber could not be installed (usually because one
    /// already is).
    #[error("Failed to initialize logging: {0}")]
    InitError(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
