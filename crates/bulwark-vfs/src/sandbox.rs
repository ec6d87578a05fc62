use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::path::strip_prefix;
use crate::{
    Backend, BackendError, FileStat, Location, Mount, MountTable, Operation, PermissionGate,
    ResolvedSandboxConfig, SandboxConfig, SandboxError, SandboxResult, SandboxRestriction,
    VirtualPath,
};

/// A permission-checked virtual view of a backend.
///
/// Every operation normalizes the incoming path, resolves it through the
/// mount table and consults the permission gate before the backend is touched.
/// Errors only ever mention virtual paths.
#[derive(Clone, Debug)]
pub struct Sandbox {
    config: ResolvedSandboxConfig,
    backend: Arc<dyn Backend>,
}

impl Sandbox {
    /// Build a sandbox from construction config.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::InvalidPath` if the root or any mount is not
    /// absolute, or if two mounts share a target.
    pub fn new(config: SandboxConfig, backend: Arc<dyn Backend>) -> SandboxResult<Self> {
        let config = config.resolve()?;
        debug!(
            root = %config.root,
            readonly = config.readonly,
            mounts = config.mounts.len(),
            backend = backend.kind(),
            "Sandbox created"
        );
        Ok(Self { config, backend })
    }

    /// A copy of this sandbox's configuration.
    #[must_use]
    pub fn config(&self) -> ResolvedSandboxConfig {
        self.config.clone()
    }

    /// The shared backend handle.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// The permission gate over this sandbox's configuration.
    #[must_use]
    pub fn gate(&self) -> PermissionGate<'_> {
        PermissionGate::new(&self.config)
    }

    fn locate(&self, raw: &str) -> SandboxResult<(VirtualPath, Location)> {
        let vpath = VirtualPath::parse(raw)?;
        let base = self
            .config
            .mounts
            .find(&vpath)
            .map_or_else(|| self.config.root.clone(), |m| m.source.clone());
        let path = self.config.mounts.resolve(&self.config.root, &vpath);
        Ok((vpath, Location::new(base, path)))
    }

    /// Roots, mount points and ancestors of mount points: directories that
    /// exist because of configuration rather than because of the backend.
    fn is_structural(&self, vpath: &VirtualPath) -> bool {
        vpath.is_root() || self.config.mounts.is_mount_point(vpath) || self.config.mounts.has_mount_below(vpath)
    }

    /// Concrete location for `path`.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::InvalidPath` for a malformed or escaping path.
    pub fn resolve(&self, path: &str) -> SandboxResult<String> {
        let (_, loc) = self.locate(path)?;
        Ok(loc.path)
    }

    /// Whether `path` may be written.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::InvalidPath` for a malformed or escaping path.
    pub fn can_write(&self, path: &str) -> SandboxResult<bool> {
        let vpath = VirtualPath::parse(path)?;
        Ok(self.gate().can_write(&vpath))
    }

    /// Whether `op` on `path` is allowed by the gate.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::InvalidPath` for a bad path, or
    /// `SandboxError::ReadOnly` for a mutation in a read-only region.
    pub fn check(&self, path: &str, op: Operation) -> SandboxResult<()> {
        let vpath = VirtualPath::parse(path)?;
        self.gate().check(&vpath, op)
    }

    /// Read a UTF-8 text file.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidPath`, or `Io` when the content is not UTF-8.
    pub async fn read(&self, path: &str) -> SandboxResult<String> {
        let bytes = self.read_binary(path).await?;
        String::from_utf8(bytes).map_err(|_| SandboxError::Io {
            path: path.to_owned(),
            message: "file is not valid UTF-8; use read_binary".into(),
        })
    }

    /// Read raw bytes.
    ///
    /// # Errors
    ///
    /// `NotFound` or `InvalidPath`.
    pub async fn read_binary(&self, path: &str) -> SandboxResult<Vec<u8>> {
        let (vpath, loc) = self.locate(path)?;
        debug!(path = %vpath, "Sandbox read");
        self.backend
            .read(&loc)
            .await
            .map_err(|e| backend_error(e, &vpath))
    }

    /// Write UTF-8 text, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// `ReadOnly` outside writable regions, `InvalidPath`, `QuotaExceeded`.
    pub async fn write(&self, path: &str, content: &str) -> SandboxResult<()> {
        self.write_binary(path, content.as_bytes()).await
    }

    /// Write raw bytes, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// `ReadOnly` outside writable regions, `InvalidPath`, `QuotaExceeded`,
    /// or `PermissionDenied` when targeting a root or mount point.
    pub async fn write_binary(&self, path: &str, content: &[u8]) -> SandboxResult<()> {
        let (vpath, loc) = self.locate(path)?;
        self.gate().check(&vpath, Operation::Write)?;
        if self.is_structural(&vpath) {
            return Err(SandboxError::PermissionDenied(format!(
                "{vpath} is a sandbox root or mount point and cannot be overwritten"
            )));
        }
        debug!(path = %vpath, bytes = content.len(), "Sandbox write");
        self.backend
            .write(&loc, content)
            .await
            .map_err(|e| backend_error(e, &vpath))
    }

    /// Delete a file or directory tree.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for the sandbox root or a mount root, `ReadOnly`,
    /// `NotFound`, `InvalidPath`.
    pub async fn delete(&self, path: &str) -> SandboxResult<()> {
        let (vpath, loc) = self.locate(path)?;
        if self.is_structural(&vpath) {
            return Err(SandboxError::PermissionDenied(format!(
                "{vpath} is a sandbox root or mount point and cannot be deleted"
            )));
        }
        self.gate().check(&vpath, Operation::Delete)?;
        debug!(path = %vpath, "Sandbox delete");
        self.backend
            .delete(&loc)
            .await
            .map_err(|e| backend_error(e, &vpath))
    }

    /// Whether anything exists at `path`.
    ///
    /// # Errors
    ///
    /// `InvalidPath`.
    pub async fn exists(&self, path: &str) -> SandboxResult<bool> {
        let (vpath, loc) = self.locate(path)?;
        if self.is_structural(&vpath) {
            return Ok(true);
        }
        match self.backend.exists(&loc).await {
            Ok(found) => Ok(found),
            Err(BackendError::NotFound | BackendError::NotADirectory) => Ok(false),
            Err(e) => Err(backend_error(e, &vpath)),
        }
    }

    /// Sorted names of the entries directly inside `path`, including mount
    /// points that are direct children.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidPath`.
    pub async fn list(&self, path: &str) -> SandboxResult<Vec<String>> {
        let (vpath, loc) = self.locate(path)?;
        let mut names: BTreeSet<String> = match self.backend.list(&loc).await {
            Ok(names) => names.into_iter().collect(),
            Err(BackendError::NotFound) if self.is_structural(&vpath) => BTreeSet::new(),
            Err(e) => return Err(backend_error(e, &vpath)),
        };
        names.extend(self.config.mounts.child_names(&vpath).map(str::to_owned));
        debug!(path = %vpath, entries = names.len(), "Sandbox list");
        Ok(names.into_iter().collect())
    }

    /// File or directory metadata.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidPath`.
    pub async fn stat(&self, path: &str) -> SandboxResult<FileStat> {
        let (vpath, loc) = self.locate(path)?;
        match self.backend.stat(&loc).await {
            Ok(stat) => Ok(stat),
            Err(BackendError::NotFound) if self.is_structural(&vpath) => Ok(FileStat {
                size: 0,
                created_at: DateTime::<Utc>::UNIX_EPOCH,
                modified_at: DateTime::<Utc>::UNIX_EPOCH,
                is_directory: true,
            }),
            Err(e) => Err(backend_error(e, &vpath)),
        }
    }

    /// Create a directory and any missing parents.
    ///
    /// # Errors
    ///
    /// `FileExists` when a file occupies the path, `ReadOnly`, `InvalidPath`.
    pub async fn mkdir(&self, path: &str) -> SandboxResult<()> {
        let (vpath, loc) = self.locate(path)?;
        if self.is_structural(&vpath) {
            return Ok(());
        }
        self.gate().check(&vpath, Operation::Write)?;
        debug!(path = %vpath, "Sandbox mkdir");
        self.backend
            .mkdir(&loc)
            .await
            .map_err(|e| backend_error(e, &vpath))
    }

    /// Derive a strictly narrower sandbox for a delegated worker.
    ///
    /// The child shares this sandbox's backend; this sandbox is unchanged.
    /// Anything the child may write, this sandbox may write at the
    /// corresponding path under the restriction prefix.
    ///
    /// # Errors
    ///
    /// `PermissionEscalation` when write access is requested for a read-only
    /// region, `InvalidPath` for a bad restriction path.
    pub fn restrict(&self, restriction: &SandboxRestriction) -> SandboxResult<Self> {
        let parent = &self.config;

        let (root, region_readonly, mounts, anchor) = match &restriction.restrict {
            None => (parent.root.clone(), parent.readonly, parent.mounts.as_slice().to_vec(), None),
            Some(raw) => {
                let anchor = VirtualPath::parse(raw)?;
                let matched_readonly = parent.mounts.find(&anchor).is_some_and(|m| m.readonly);
                let root = parent.mounts.resolve(&parent.root, &anchor);
                // Mounts at the anchor become the root; only strictly deeper ones survive.
                let mounts = parent
                    .mounts
                    .iter()
                    .filter_map(|m| {
                        let rest = strip_prefix(&m.target, anchor.as_str())?;
                        (!rest.is_empty()).then(|| Mount {
                            source: m.source.clone(),
                            target: rest.to_owned(),
                            readonly: m.readonly,
                        })
                    })
                    .collect();
                (root, parent.readonly || matched_readonly, mounts, Some(anchor))
            },
        };

        if restriction.readonly == Some(false) && region_readonly {
            let at = anchor.as_ref().map_or("/", VirtualPath::as_str);
            return Err(SandboxError::PermissionEscalation(format!(
                "cannot grant write access to {at}: the parent sandbox is read-only there"
            )));
        }

        let force_readonly = restriction.readonly == Some(true);
        let mounts = mounts
            .into_iter()
            .map(|m| Mount {
                readonly: m.readonly || force_readonly,
                ..m
            })
            .collect::<Vec<_>>();

        let config = ResolvedSandboxConfig {
            root,
            readonly: region_readonly || force_readonly,
            mounts: MountTable::new(mounts)?,
        };
        debug!(
            restrict = ?restriction.restrict,
            root = %config.root,
            readonly = config.readonly,
            mounts = config.mounts.len(),
            "Sandbox restricted"
        );
        Ok(Self {
            config,
            backend: Arc::clone(&self.backend),
        })
    }
}

fn backend_error(err: BackendError, vpath: &VirtualPath) -> SandboxError {
    let path = vpath.to_string();
    match err {
        BackendError::NotFound => SandboxError::NotFound(path),
        BackendError::AlreadyExists => SandboxError::FileExists(path),
        BackendError::QuotaExceeded { .. } => SandboxError::QuotaExceeded(path),
        BackendError::Escape(_) => SandboxError::invalid(path, "path escape attempt"),
        BackendError::NotADirectory => SandboxError::Io {
            path,
            message: "a parent of this path is a file".into(),
        },
        BackendError::IsADirectory => SandboxError::Io {
            path,
            message: "path is a directory".into(),
        },
        // The io::Error text may carry host paths; keep only its kind.
        BackendError::Io(e) => SandboxError::Io {
            path,
            message: e.kind().to_string(),
        },
    }
}
