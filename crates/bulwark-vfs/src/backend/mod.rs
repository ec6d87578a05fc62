use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Host filesystem backend.
pub mod host;
/// In-memory, origin-isolated backend.
pub mod memory;

pub use host::HostBackend;
pub use memory::MemoryBackend;

/// A concrete location handed to a backend.
///
/// `base` is the root or mount source the path was resolved under; backends
/// that can be tricked by links use it to confirm containment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Root or mount source the path lives under.
    pub base: String,
    /// Full concrete path.
    pub path: String,
}

impl Location {
    /// Build a location.
    #[must_use]
    pub fn new(base: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            path: path.into(),
        }
    }

    /// Whether this location is its own base (a root or mount root).
    #[must_use]
    pub fn is_base(&self) -> bool {
        self.base == self.path
    }
}

/// Metadata returned by `stat`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileStat {
    /// Size in bytes (zero for directories).
    pub size: u64,
    /// Creation time; falls back to modification time where unsupported.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
    /// True for directories.
    pub is_directory: bool,
}

/// Failures at the backend boundary.
///
/// Messages may contain concrete locations; [`crate::Sandbox`] never forwards
/// them verbatim.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Nothing exists at the location.
    #[error("not found")]
    NotFound,
    /// Something already exists at the location.
    #[error("already exists")]
    AlreadyExists,
    /// A path component is a file where a directory is required.
    #[error("not a directory")]
    NotADirectory,
    /// A directory was found where a file is required.
    #[error("is a directory")]
    IsADirectory,
    /// Storage is full.
    #[error("quota exceeded: {used} of {limit} bytes in use")]
    QuotaExceeded {
        /// Bytes currently stored.
        used: u64,
        /// Configured limit.
        limit: u64,
    },
    /// The location resolved outside its base (e.g. via a symlink).
    #[error("sandbox escape: {0}")]
    Escape(String),
    /// Any other I/O failure.
    #[error("{0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::AlreadyExists => Self::AlreadyExists,
            ErrorKind::NotADirectory => Self::NotADirectory,
            ErrorKind::IsADirectory => Self::IsADirectory,
            ErrorKind::StorageFull => Self::QuotaExceeded { used: 0, limit: 0 },
            _ => Self::Io(err),
        }
    }
}

/// Convenience result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Physical storage behind a sandbox.
///
/// Implementations receive already-resolved concrete locations and perform no
/// permission checks of their own.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Read a whole file.
    async fn read(&self, loc: &Location) -> BackendResult<Vec<u8>>;

    /// Create or overwrite a file, creating missing parent directories.
    async fn write(&self, loc: &Location, data: &[u8]) -> BackendResult<()>;

    /// Remove a file, or a directory and everything beneath it.
    async fn delete(&self, loc: &Location) -> BackendResult<()>;

    /// Whether anything exists at the location.
    async fn exists(&self, loc: &Location) -> BackendResult<bool>;

    /// Names of the direct children of a directory, unsorted.
    async fn list(&self, loc: &Location) -> BackendResult<Vec<String>>;

    /// Metadata for a file or directory.
    async fn stat(&self, loc: &Location) -> BackendResult<FileStat>;

    /// Create a directory and any missing parents. Succeeds if it already
    /// exists as a directory.
    async fn mkdir(&self, loc: &Location) -> BackendResult<()>;
}
