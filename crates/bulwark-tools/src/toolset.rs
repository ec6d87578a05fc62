//! The toolset trait and its optional capabilities.

use bulwark_approval::RiskLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ToolContext, ToolError, ToolResult};

/// A tool as advertised to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// What a toolset says about a particular call before it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalRequirement {
    /// Refuse without asking anyone.
    Blocked {
        /// Shown to the LLM.
        reason: String,
        /// Machine-readable code of the underlying error.
        code: &'static str,
        /// What the LLM should try instead.
        hint: Option<&'static str>,
    },
    /// Run without asking.
    PreApproved,
    /// Ask the approval controller.
    Required,
}

impl ApprovalRequirement {
    /// Block the call because of `err`, keeping its code and hint.
    #[must_use]
    pub fn blocked(err: &ToolError) -> Self {
        Self::Blocked {
            reason: err.to_string(),
            code: err.code(),
            hint: err.hint(),
        }
    }
}

/// Per-call approval policy a toolset may provide.
///
/// Toolsets without it have every call approved through the controller.
pub trait NeedsApproval: Send + Sync {
    /// Classify one call.
    fn approval_requirement(&self, tool_name: &str, args: &Value, ctx: &ToolContext) -> ApprovalRequirement;
}

/// Custom wording for approval prompts.
pub trait ApprovalDescription: Send + Sync {
    /// One line shown to the user.
    fn describe(&self, tool_name: &str, args: &Value) -> String;

    /// Risk shown alongside the description.
    fn risk(&self, _tool_name: &str, _args: &Value) -> RiskLevel {
        RiskLevel::Medium
    }
}

/// A named group of tools.
#[async_trait::async_trait]
pub trait Toolset: Send + Sync {
    /// Toolset name (used in logs and duplicate-tool errors).
    fn name(&self) -> &str;

    /// Tools this toolset provides.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run one tool.
    async fn call(&self, tool_name: &str, args: &Value, ctx: &ToolContext) -> ToolResult<Value>;

    /// Approval policy, if the toolset has one.
    fn needs_approval(&self) -> Option<&dyn NeedsApproval> {
        None
    }

    /// Approval prompt wording, if the toolset has one.
    fn approval_description(&self) -> Option<&dyn ApprovalDescription> {
        None
    }
}

/// Fetch a required string argument.
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> ToolResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| crate::ToolError::InvalidArguments(format!("{key} is required")))
}
