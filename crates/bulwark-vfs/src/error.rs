use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable error codes surfaced to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The path does not exist.
    NotFound,
    /// The path is malformed or attempts to escape the sandbox.
    InvalidPath,
    /// The path lies in a read-only region.
    ReadOnly,
    /// A restriction asked for more access than its parent has.
    PermissionEscalation,
    /// Something already exists where a new entry was requested.
    FileExists,
    /// The backing store is out of space.
    QuotaExceeded,
    /// The operation is never allowed on this path.
    PermissionDenied,
    /// Any other storage failure.
    IoError,
}

impl ErrorCode {
    /// The wire representation of this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidPath => "INVALID_PATH",
            Self::ReadOnly => "READ_ONLY",
            Self::PermissionEscalation => "PERMISSION_ESCALATION",
            Self::FileExists => "FILE_EXISTS",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::IoError => "IO_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the sandbox API.
///
/// Paths carried here are always *virtual* paths as the caller wrote them (or
/// their normalized form). Concrete backing locations never appear in these
/// messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// The path is malformed or tries to traverse above the virtual root.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Missing file or directory.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write or delete attempted inside a read-only region.
    #[error("Path is read-only: {0}")]
    ReadOnly(String),

    /// A restriction requested more access than the parent sandbox grants.
    #[error("Permission escalation: {0}")]
    PermissionEscalation(String),

    /// Operation not permitted on this path regardless of mode.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// An entry already exists where a new one was requested.
    #[error("Already exists: {0}")]
    FileExists(String),

    /// The backend ran out of space.
    #[error("Storage quota exceeded while writing {0}")]
    QuotaExceeded(String),

    /// Any other backend failure.
    #[error("I/O error at {path}: {message}")]
    Io {
        /// The virtual path being operated on.
        path: String,
        /// Backend message.
        message: String,
    },
}

impl SandboxError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidPath { .. } => ErrorCode::InvalidPath,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::ReadOnly(_) => ErrorCode::ReadOnly,
            Self::PermissionEscalation(_) => ErrorCode::PermissionEscalation,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::FileExists(_) => ErrorCode::FileExists,
            Self::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            Self::Io { .. } => ErrorCode::IoError,
        }
    }

    /// A short instruction an LLM can act on, distinct from the message.
    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. } => {
                "Use an absolute path starting with '/' that stays inside the sandbox (no '..' above the root)."
            },
            Self::NotFound(_) => "Check the path; use list_files on the parent directory to see what exists.",
            Self::ReadOnly(_) => "This location is read-only. Write to a writable location instead.",
            Self::PermissionEscalation(_) => {
                "A delegated worker cannot be given more access than its caller. Request a read-only or narrower sandbox."
            },
            Self::PermissionDenied(_) => "This operation is not allowed on this path.",
            Self::FileExists(_) => "Something already exists at this path. Choose a different path or remove it first.",
            Self::QuotaExceeded(_) => "Storage is full. Delete unneeded files or write less data.",
            Self::Io { .. } => "The storage backend failed. Retrying may help; otherwise try a different path.",
        }
    }

    /// Whether the LLM can reasonably recover by retrying with different input.
    ///
    /// Escalation errors are configuration bugs in the caller and are not
    /// recoverable from inside a conversation.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::PermissionEscalation(_))
    }
}

/// Convenience result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::PermissionEscalation).unwrap();
        assert_eq!(json, "\"PERMISSION_ESCALATION\"");
        assert_eq!(ErrorCode::QuotaExceeded.to_string(), "QUOTA_EXCEEDED");
    }

    #[test]
    fn test_hint_differs_from_message() {
        let err = SandboxError::ReadOnly("/docs/a.md".into());
        assert_eq!(err.code(), ErrorCode::ReadOnly);
        assert_ne!(err.hint(), err.to_string());
        assert!(err.to_string().contains("/docs/a.md"));
    }

    #[test]
    fn test_escalation_not_recoverable() {
        assert!(!SandboxError::PermissionEscalation("x".into()).is_recoverable());
        assert!(SandboxError::NotFound("x".into()).is_recoverable());
    }
}
