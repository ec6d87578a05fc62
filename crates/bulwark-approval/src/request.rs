//! Approval request and decision types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req:{}", self.0)
    }
}

/// Risk level shown to the user alongside a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Read-only or otherwise harmless.
    Low,
    /// Modifies sandboxed state.
    #[default]
    Medium,
    /// Destructive or hard to undo.
    High,
    /// Grants new authority (e.g. spawning another worker).
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A request for a user decision about one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request identifier.
    pub id: RequestId,
    /// Tool being invoked.
    pub tool_name: String,
    /// Tool arguments, keys ordered.
    pub tool_args: BTreeMap<String, Value>,
    /// Human-readable summary shown to the user.
    pub description: String,
    /// Assessed risk.
    pub risk: RiskLevel,
    /// When the request was created.
    pub timestamp: DateTime<Utc>,
}

impl ApprovalRequest {
    /// Create a request for `tool_name` called with `args`.
    ///
    /// Object arguments are taken key by key; `null` means no arguments; any
    /// other value is stored under the `input` key.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, args: Value, description: impl Into<String>) -> Self {
        let tool_args = match args {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => BTreeMap::new(),
            other => BTreeMap::from([("input".to_owned(), other)]),
        };
        Self {
            id: RequestId::new(),
            tool_name: tool_name.into(),
            tool_args,
            description: description.into(),
            risk: RiskLevel::default(),
            timestamp: Utc::now(),
        }
    }

    /// Set the risk level.
    #[must_use]
    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }
}

impl fmt::Display for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} - {}", self.risk, self.tool_name, self.description)
    }
}

/// How long an approval should be remembered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RememberScope {
    /// Ask again next time.
    #[default]
    None,
    /// Reuse for identical calls until the controller is dropped or cleared.
    Session,
}

/// The user's answer to an [`ApprovalRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Go ahead.
    Approved {
        /// Whether identical calls should skip the prompt.
        #[serde(default)]
        remember: RememberScope,
    },
    /// Do not run the tool.
    Denied {
        /// Optional explanation, relayed to the LLM.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl ApprovalDecision {
    /// Approve this call only.
    #[must_use]
    pub fn approve_once() -> Self {
        Self::Approved {
            remember: RememberScope::None,
        }
    }

    /// Approve this call and identical ones for the rest of the session.
    #[must_use]
    pub fn approve_for_session() -> Self {
        Self::Approved {
            remember: RememberScope::Session,
        }
    }

    /// Deny with an explanation.
    #[must_use]
    pub fn deny(note: impl Into<String>) -> Self {
        Self::Denied {
            note: Some(note.into()),
        }
    }

    /// Check if the decision allows the call.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    /// Whether this decision should be cached for the session.
    #[must_use]
    pub fn is_session_scoped(&self) -> bool {
        matches!(
            self,
            Self::Approved {
                remember: RememberScope::Session
            }
        )
    }

    /// The denial note, if any.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Denied { note } => note.as_deref(),
            Self::Approved { .. } => None,
        }
    }
}
