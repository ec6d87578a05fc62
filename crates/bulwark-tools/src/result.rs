use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ToolError;

/// One tool invocation requested by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id assigned by the LLM loop.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    /// Create a call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// How a tool call ended.
///
/// Every variant is a normal result for the LLM; none of them is an error
/// that aborts the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool ran.
    Success {
        /// The tool's raw result.
        output: Value,
        /// Whether it ran without asking the user.
        pre_approved: bool,
    },
    /// The user (or approval mode) said no.
    Denied {
        /// `Operation denied: ...`
        error: String,
    },
    /// The toolset refused the call before approval.
    Blocked {
        /// `Operation blocked: ...`
        error: String,
        /// Machine-readable code.
        code: String,
        /// What to try next.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    /// The tool ran and failed, or could not be dispatched.
    Failed {
        /// Error message.
        error: String,
        /// Machine-readable code.
        code: String,
        /// What to try next.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    /// Cancelled before completion.
    Interrupted {
        /// Output the tool emitted before it was stopped.
        partial_output: String,
    },
}

impl ToolOutcome {
    pub(crate) fn failed(err: &ToolError) -> Self {
        Self::Failed {
            error: err.to_string(),
            code: err.code().to_owned(),
            hint: err.hint().map(str::to_owned),
        }
    }

    /// Whether the tool ran to completion.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether the call was cut short by cancellation.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// The payload handed back to the LLM.
    #[must_use]
    pub fn to_llm_value(&self) -> Value {
        match self {
            Self::Success { output, pre_approved } => {
                json!({ "success": true, "output": output, "preApproved": pre_approved })
            },
            Self::Denied { error } => {
                json!({ "success": false, "error": error })
            },
            Self::Blocked { error, code, hint } | Self::Failed { error, code, hint } => {
                let mut value = json!({ "success": false, "error": error, "code": code });
                if let (Some(hint), Some(obj)) = (hint, value.as_object_mut()) {
                    obj.insert("hint".into(), Value::String(hint.clone()));
                }
                value
            },
            Self::Interrupted { partial_output } => {
                json!({ "success": false, "interrupted": true, "partialOutput": partial_output })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_vfs::SandboxError;

    #[test]
    fn test_denied_llm_shape() {
        let outcome = ToolOutcome::Denied {
            error: "Operation denied: too risky".into(),
        };
        assert_eq!(
            outcome.to_llm_value(),
            json!({"success": false, "error": "Operation denied: too risky"})
        );
    }

    #[test]
    fn test_failed_carries_code_and_hint() {
        let err = ToolError::Sandbox(SandboxError::ReadOnly("/docs/a".into()));
        let value = ToolOutcome::failed(&err).to_llm_value();
        assert_eq!(value["code"], "READ_ONLY");
        assert!(value["hint"].as_str().is_some());
        assert_eq!(value["error"], "Path is read-only: /docs/a");
    }

    #[test]
    fn test_tool_call_args_default() {
        let call: ToolCall = serde_json::from_value(json!({"id": "1", "name": "list_files"})).unwrap();
        assert_eq!(call.args, Value::Null);
    }
}
