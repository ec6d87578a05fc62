use crate::{ResolvedSandboxConfig, SandboxError, SandboxResult, VirtualPath};

/// Operations a caller can ask the gate about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read file contents or metadata.
    Read,
    /// Create or overwrite.
    Write,
    /// Remove.
    Delete,
    /// Enumerate a directory.
    List,
}

impl Operation {
    /// Whether the operation modifies storage.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Write | Self::Delete)
    }
}

/// Decides write permission for normalized virtual paths.
///
/// Reads, listings and stats are always allowed here; only mutations consult
/// the readonly flags.
#[derive(Debug, Clone, Copy)]
pub struct PermissionGate<'a> {
    config: &'a ResolvedSandboxConfig,
}

impl<'a> PermissionGate<'a> {
    /// A gate over `config`.
    #[must_use]
    pub fn new(config: &'a ResolvedSandboxConfig) -> Self {
        Self { config }
    }

    /// The matched mount's flag, else the sandbox-wide flag.
    #[must_use]
    pub fn can_write(&self, path: &VirtualPath) -> bool {
        match self.config.mounts.find(path) {
            Some(mount) => !mount.readonly,
            None => !self.config.readonly,
        }
    }

    /// Whether `op` is allowed on `path`.
    #[must_use]
    pub fn allows(&self, path: &VirtualPath, op: Operation) -> bool {
        !op.is_mutation() || self.can_write(path)
    }

    /// Check `op` against `path`.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::ReadOnly` for a mutation in a read-only region.
    pub fn check(&self, path: &VirtualPath, op: Operation) -> SandboxResult<()> {
        if self.allows(path, op) {
            Ok(())
        } else {
            Err(SandboxError::ReadOnly(path.to_string()))
        }
    }

    /// Shorthand for `check(path, Operation::Write)`.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::ReadOnly` if `path` is not writable.
    pub fn assert_writable(&self, path: &VirtualPath) -> SandboxResult<()> {
        self.check(path, Operation::Write)
    }
}
