use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::path::{join_real, strip_prefix};
use crate::{SandboxError, SandboxResult, VirtualPath};

/// A virtual prefix mapped onto a concrete backing location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Concrete backing location (normalized, absolute).
    pub source: String,
    /// Virtual prefix inside the sandbox (normalized, no trailing slash).
    pub target: String,
    /// Whether writes beneath `target` are refused.
    pub readonly: bool,
}

impl Mount {
    /// Build a mount, normalizing both ends.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::InvalidPath` if either end is relative or
    /// escapes its root.
    pub fn new(source: &str, target: &str, readonly: bool) -> SandboxResult<Self> {
        let source = VirtualPath::parse(source)
            .map_err(|_| SandboxError::invalid(source, "mount source must be an absolute path"))?;
        let target = VirtualPath::parse(target)
            .map_err(|_| SandboxError::invalid(target, "mount target must be an absolute path"))?;
        Ok(Self {
            source: source.into(),
            target: target.into(),
            readonly,
        })
    }

    /// The remainder of `path` below this mount's target, if it matches.
    fn remainder<'a>(&self, path: &'a str) -> Option<&'a str> {
        strip_prefix(path, &self.target)
    }
}

/// Mounts ordered so the longest (most specific) target is tried first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    /// Build a table, rejecting duplicate targets.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::InvalidPath` when two mounts share a target.
    pub fn new(mounts: impl IntoIterator<Item = Mount>) -> SandboxResult<Self> {
        let mut mounts: Vec<Mount> = mounts.into_iter().collect();
        let mut seen = HashSet::new();
        for mount in &mounts {
            if !seen.insert(mount.target.as_str()) {
                return Err(SandboxError::invalid(
                    mount.target.clone(),
                    "duplicate mount target",
                ));
            }
        }
        mounts.sort_by(|a, b| {
            b.target
                .len()
                .cmp(&a.target.len())
                .then_with(|| a.target.cmp(&b.target))
        });
        Ok(Self { mounts })
    }

    /// The most specific mount covering `path`, if any.
    #[must_use]
    pub fn find(&self, path: &VirtualPath) -> Option<&Mount> {
        self.mounts
            .iter()
            .find(|m| m.remainder(path.as_str()).is_some())
    }

    /// Map a virtual path to its concrete location.
    ///
    /// Paths under no mount are placed beneath `root`.
    #[must_use]
    pub fn resolve(&self, root: &str, path: &VirtualPath) -> String {
        for mount in &self.mounts {
            if let Some(rest) = mount.remainder(path.as_str()) {
                return join_real(&mount.source, rest);
            }
        }
        join_real(root, path.as_str())
    }

    /// Whether `path` is exactly some mount's target.
    #[must_use]
    pub fn is_mount_point(&self, path: &VirtualPath) -> bool {
        self.mounts.iter().any(|m| m.target == path.as_str())
    }

    /// Whether some mount target lies strictly below `path`.
    ///
    /// Such a path exists as a directory even when nothing backs it.
    #[must_use]
    pub fn has_mount_below(&self, path: &VirtualPath) -> bool {
        self.mounts.iter().any(|m| {
            strip_prefix(&m.target, path.as_str()).is_some_and(|rest| !rest.is_empty())
        })
    }

    /// Names of entries that mounts contribute directly under `dir`.
    ///
    /// A mount at `/a/b/c` contributes `b` to a listing of `/a`.
    pub fn child_names<'a>(&'a self, dir: &'a VirtualPath) -> impl Iterator<Item = &'a str> + 'a {
        self.mounts.iter().filter_map(move |m| {
            let rest = strip_prefix(&m.target, dir.as_str())?;
            rest.split('/').find(|s| !s.is_empty())
        })
    }

    /// Iterate mounts in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.iter()
    }

    /// Mounts in resolution order.
    #[must_use]
    pub fn as_slice(&self) -> &[Mount] {
        &self.mounts
    }

    /// Number of mounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}
