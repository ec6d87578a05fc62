//! Configuration types.
//!
//! All sections default to the values in `defaults.toml`. Modes and formats
//! are kept as strings here and turned into domain types at the integration
//! boundary.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The worker sandbox: root directory and mounts.
    pub sandbox: SandboxSection,
    /// How approval requests are answered.
    pub approval: ApprovalSection,
    /// Worker-to-worker delegation limits.
    pub delegation: DelegationSection,
    /// Built-in tool approval policy.
    pub tools: ToolsSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// SandboxSection
// ---------------------------------------------------------------------------

/// Sandbox root and mounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Absolute backing path that the virtual root maps to.
    pub root: String,
    /// Make the whole sandbox read-only.
    pub readonly: bool,
    /// Extra backing directories exposed at virtual paths.
    pub mounts: Vec<MountSection>,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            root: "/tmp/bulwark/sandbox".to_owned(),
            readonly: false,
            mounts: Vec::new(),
        }
    }
}

/// One `[[sandbox.mounts]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSection {
    /// Absolute backing path.
    pub source: String,
    /// Absolute virtual path where `source` appears.
    pub target: String,
    /// Whether the mount is read-only.
    #[serde(default)]
    pub readonly: bool,
}

// ---------------------------------------------------------------------------
// ApprovalSection
// ---------------------------------------------------------------------------

/// Approval mode selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSection {
    /// `"interactive"`, `"approve_all"` or `"auto_deny"`.
    pub mode: String,
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self {
            mode: "interactive".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// DelegationSection
// ---------------------------------------------------------------------------

/// Delegation limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationSection {
    /// Maximum nesting of `call_worker` below the root worker.
    pub max_depth: usize,
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self { max_depth: 3 }
    }
}

// ---------------------------------------------------------------------------
// ToolsSection
// ---------------------------------------------------------------------------

/// Approval policy of the built-in filesystem tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// Ask before reads, listings and stats.
    pub require_approval_for_reads: bool,
    /// Ask before writes, deletes and mkdir.
    pub require_approval_for_writes: bool,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            require_approval_for_reads: false,
            require_approval_for_writes: true,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["bulwark_vfs=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
