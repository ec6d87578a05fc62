use serde::{Deserialize, Serialize};

use crate::{Mount, MountTable, SandboxError, SandboxResult, VirtualPath};

/// A mount as written in sandbox construction config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Concrete backing location.
    pub source: String,
    /// Virtual prefix.
    pub target: String,
    /// Refuse writes beneath `target`.
    #[serde(default)]
    pub readonly: bool,
}

impl MountConfig {
    /// A writable mount of `source` at `target`.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            readonly: false,
        }
    }

    /// Mark the mount read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }
}

/// Sandbox construction config: `{ root, readonly?, mounts? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Concrete location backing every unmounted virtual path.
    pub root: String,
    /// Refuse writes outside writable mounts.
    #[serde(default)]
    pub readonly: bool,
    /// Additional mounts.
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

impl SandboxConfig {
    /// A writable sandbox rooted at `root` with no mounts.
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            readonly: false,
            mounts: Vec::new(),
        }
    }

    /// Add a mount.
    #[must_use]
    pub fn with_mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Make the root region read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Normalize and validate into the form a sandbox holds.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::InvalidPath` for a relative root, a malformed
    /// mount, or duplicate mount targets.
    pub fn resolve(&self) -> SandboxResult<ResolvedSandboxConfig> {
        let root = VirtualPath::parse(&self.root)
            .map_err(|_| SandboxError::invalid(self.root.clone(), "sandbox root must be an absolute path"))?;
        let mounts = self
            .mounts
            .iter()
            .map(|m| Mount::new(&m.source, &m.target, m.readonly))
            .collect::<SandboxResult<Vec<_>>>()?;
        Ok(ResolvedSandboxConfig {
            root: root.into(),
            readonly: self.readonly,
            mounts: MountTable::new(mounts)?,
        })
    }
}

/// The normalized configuration owned by one [`crate::Sandbox`].
///
/// Only [`crate::Sandbox::restrict`] produces a new one from an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSandboxConfig {
    /// Normalized concrete root.
    pub root: String,
    /// Whether the root region is read-only.
    pub readonly: bool,
    /// Mounts, longest target first.
    pub mounts: MountTable,
}

/// How a delegated worker's sandbox should be narrowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRestriction {
    /// Virtual path that becomes the child's root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict: Option<String>,
    /// Force read-only (`Some(true)`) or ask for write access (`Some(false)`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,
}

impl SandboxRestriction {
    /// Restrict to the subtree at `path`.
    #[must_use]
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            restrict: Some(path.into()),
            readonly: None,
        }
    }

    /// Same view, but read-only.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            restrict: None,
            readonly: Some(true),
        }
    }

    /// Set the requested readonly flag.
    #[must_use]
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = Some(readonly);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_optional_fields() {
        let cfg: SandboxConfig = serde_json::from_str(
            r#"{"root": "/proj", "mounts": [{"source": "/data", "target": "/d"}]}"#,
        )
        .unwrap();
        assert!(!cfg.readonly);
        assert!(!cfg.mounts[0].readonly);
    }

    #[test]
    fn test_resolve_normalizes() {
        let resolved = SandboxConfig::new("/proj//")
            .with_mount(MountConfig::new("/data/", "/d/").read_only())
            .resolve()
            .unwrap();
        assert_eq!(resolved.root, "/proj");
        let m = resolved.mounts.iter().next().unwrap();
        assert_eq!((m.source.as_str(), m.target.as_str(), m.readonly), ("/data", "/d", true));
    }

    #[test]
    fn test_relative_root_rejected() {
        assert!(matches!(
            SandboxConfig::new("proj").resolve(),
            Err(SandboxError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_restriction_from_json() {
        let r: SandboxRestriction =
            serde_json::from_str(r#"{"restrict": "/d", "readonly": true}"#).unwrap();
        assert_eq!(r, SandboxRestriction::to("/d").with_readonly(true));
        let empty: SandboxRestriction = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, SandboxRestriction::default());
    }
}
