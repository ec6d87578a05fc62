use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use super::{Backend, BackendError, BackendResult, FileStat, Location};

/// Largest file `read` will load into memory.
const MAX_READ_BYTES: u64 = 50 * 1024 * 1024;

/// A backend over the real filesystem.
///
/// Concrete locations are host paths. Symlinks anywhere below a base are
/// refused so a link cannot point a sandbox path outside its root or mount.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostBackend;

impl HostBackend {
    /// Create a host backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Map a location to a host path that provably stays under its base.
    ///
    /// Walks up from the target to the deepest existing ancestor, rejects
    /// symlinks on the way, and rebuilds the path from that ancestor's
    /// canonical form.
    async fn confine(loc: &Location) -> BackendResult<PathBuf> {
        let base = PathBuf::from(&loc.base);
        let target = PathBuf::from(&loc.path);
        let canonical_base = fs::canonicalize(&base).await.unwrap_or_else(|_| base.clone());

        let mut current = target.clone();
        let mut missing = Vec::new();
        loop {
            if let Ok(meta) = fs::symlink_metadata(&current).await {
                if meta.is_symlink() && current != base {
                    return Err(BackendError::Escape("symlinks are not followed inside a sandbox".into()));
                }
                let canonical = fs::canonicalize(&current).await?;
                if !canonical.starts_with(&canonical_base) {
                    return Err(BackendError::Escape("path resolves outside its sandbox root".into()));
                }
                let mut confined = canonical;
                for component in missing.into_iter().rev() {
                    confined.push(component);
                }
                return Ok(confined);
            }
            if current == base {
                break;
            }
            match (current.parent(), current.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_owned());
                    current = parent.to_path_buf();
                },
                _ => break,
            }
        }

        // Nothing on the way up exists yet, including the base itself.
        Ok(target)
    }
}

fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

async fn remove(path: &Path) -> BackendResult<()> {
    let meta = fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        fs::remove_dir_all(path).await?;
    } else {
        fs::remove_file(path).await?;
    }
    Ok(())
}

#[async_trait]
impl Backend for HostBackend {
    fn kind(&self) -> &'static str {
        "host"
    }

    async fn read(&self, loc: &Location) -> BackendResult<Vec<u8>> {
        let path = Self::confine(loc).await?;
        let meta = fs::metadata(&path).await?;
        if meta.is_dir() {
            return Err(BackendError::IsADirectory);
        }
        if meta.len() > MAX_READ_BYTES {
            return Err(BackendError::Io(std::io::Error::other(
                "file is too large to read into memory (> 50MB)",
            )));
        }
        Ok(fs::read(&path).await?)
    }

    async fn write(&self, loc: &Location, data: &[u8]) -> BackendResult<()> {
        let path = Self::confine(loc).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            return Err(BackendError::IsADirectory);
        }
        fs::write(&path, data).await?;
        Ok(())
    }

    async fn delete(&self, loc: &Location) -> BackendResult<()> {
        let path = Self::confine(loc).await?;
        remove(&path).await
    }

    async fn exists(&self, loc: &Location) -> BackendResult<bool> {
        let path = match Self::confine(loc).await {
            Ok(path) => path,
            Err(BackendError::NotFound | BackendError::NotADirectory) => return Ok(false),
            Err(e) => return Err(e),
        };
        match fs::try_exists(&path).await {
            Ok(exists) => Ok(exists),
            Err(e) => match BackendError::from(e) {
                BackendError::NotFound | BackendError::NotADirectory => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn list(&self, loc: &Location) -> BackendResult<Vec<String>> {
        let path = Self::confine(loc).await?;
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(&path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(entries)
    }

    async fn stat(&self, loc: &Location) -> BackendResult<FileStat> {
        let path = Self::confine(loc).await?;
        let meta = fs::metadata(&path).await?;
        let modified_at = to_utc(meta.modified()).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let created_at = to_utc(meta.created()).unwrap_or(modified_at);
        Ok(FileStat {
            size: if meta.is_dir() { 0 } else { meta.len() },
            created_at,
            modified_at,
            is_directory: meta.is_dir(),
        })
    }

    async fn mkdir(&self, loc: &Location) -> BackendResult<()> {
        let path = Self::confine(loc).await?;
        if fs::metadata(&path).await.is_ok_and(|m| !m.is_dir()) {
            return Err(BackendError::AlreadyExists);
        }
        fs::create_dir_all(&path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(base: &Path, rel: &str) -> Location {
        let base = base.to_string_lossy().to_string();
        let path = if rel.is_empty() { base.clone() } else { format!("{base}/{rel}") };
        Location::new(base, path)
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HostBackend::new();
        backend.write(&loc(dir.path(), "a/b/c.txt"), b"hi").await.unwrap();
        assert_eq!(backend.read(&loc(dir.path(), "a/b/c.txt")).await.unwrap(), b"hi");
        assert!(backend.stat(&loc(dir.path(), "a/b")).await.unwrap().is_directory);
    }

    #[tokio::test]
    async fn test_missing_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HostBackend::new();
        assert!(matches!(
            backend.read(&loc(dir.path(), "nope.txt")).await,
            Err(BackendError::NotFound)
        ));
        assert!(!backend.exists(&loc(dir.path(), "nope/deeper")).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_reports_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HostBackend::new();
        backend.write(&loc(dir.path(), "f"), b"x").await.unwrap();
        assert!(!backend.exists(&loc(dir.path(), "f/child")).await.unwrap());

        // A name longer than NAME_MAX fails in the kernel, not with "absent".
        let long = "a".repeat(300);
        assert!(matches!(
            backend.exists(&loc(dir.path(), &long)).await,
            Err(BackendError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HostBackend::new();
        backend.write(&loc(dir.path(), "d/x.txt"), b"x").await.unwrap();
        backend.delete(&loc(dir.path(), "d")).await.unwrap();
        assert!(!dir.path().join("d").exists());
    }

    #[tokio::test]
    async fn test_mkdir_over_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HostBackend::new();
        backend.write(&loc(dir.path(), "f"), b"x").await.unwrap();
        assert!(matches!(
            backend.mkdir(&loc(dir.path(), "f")).await,
            Err(BackendError::AlreadyExists)
        ));
        backend.mkdir(&loc(dir.path(), "g/h")).await.unwrap();
        backend.mkdir(&loc(dir.path(), "g/h")).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_blocked() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        let root = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();

        let backend = HostBackend::new();
        let err = backend.read(&loc(root.path(), "link/secret.txt")).await.unwrap_err();
        assert!(matches!(err, BackendError::Escape(_)));
        let err = backend.write(&loc(root.path(), "link/new.txt"), b"x").await.unwrap_err();
        assert!(matches!(err, BackendError::Escape(_)));
        assert!(!outside.path().join("new.txt").exists());
    }

    #[tokio::test]
    async fn test_list_names() {
        let dir = tempfile::tempdir().unwrap();
        let backend = HostBackend::new();
        backend.write(&loc(dir.path(), "b.txt"), b"").await.unwrap();
        backend.mkdir(&loc(dir.path(), "a")).await.unwrap();
        let mut names = backend.list(&loc(dir.path(), "")).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b.txt"]);
    }
}
