use bulwark_approval::ApprovalError;
use bulwark_vfs::SandboxError;

use crate::delegation::DelegationError;

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A sandbox operation failed.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// The approval layer failed (not a denial).
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// Worker delegation could not be set up.
    #[error(transparent)]
    Delegation(#[from] DelegationError),

    /// Invalid arguments.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// No toolset provides this tool.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Two toolsets claim the same tool name.
    #[error("Tool '{tool}' is already provided by toolset '{toolset}'")]
    DuplicateTool {
        /// The contested tool name.
        tool: String,
        /// Toolset that registered it first.
        toolset: String,
    },

    /// The configuration could not be turned into a working environment.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A delegated worker failed.
    #[error("Worker '{worker}' failed: {message}")]
    Worker {
        /// Worker name.
        worker: String,
        /// What went wrong.
        message: String,
    },
}

impl ToolError {
    /// Machine-readable code surfaced to the LLM.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sandbox(e) => e.code().as_str(),
            Self::Approval(_) => "APPROVAL_ERROR",
            Self::Delegation(_) => "DELEGATION_DEPTH_EXCEEDED",
            Self::InvalidArguments(_) => "INVALID_ARGUMENTS",
            Self::UnknownTool(_) => "UNKNOWN_TOOL",
            Self::DuplicateTool { .. } => "DUPLICATE_TOOL",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Worker { .. } => "WORKER_FAILED",
        }
    }

    /// What the LLM should try next, if anything useful can be said.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Sandbox(e) => Some(e.hint()),
            Self::Delegation(_) => Some("Do the work directly instead of delegating to another worker."),
            Self::InvalidArguments(_) => Some("Check the tool's input schema and retry with valid arguments."),
            Self::UnknownTool(_) => Some("Only call tools listed in the tool definitions."),
            Self::Approval(_) | Self::DuplicateTool { .. } | Self::Config(_) | Self::Worker { .. } => None,
        }
    }
}

/// Result type for tool execution.
pub type ToolResult<T> = Result<T, ToolError>;
