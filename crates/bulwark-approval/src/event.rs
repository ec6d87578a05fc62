//! Approval events exchanged with a UI.
//!
//! Outbound: `approvalRequired { requestId, type, description, risk }`.
//! Inbound: `approvalResponse { requestId, approved, reason? }` where
//! `approved` is `true`, `false`, `"session"` or `"always"`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};

use crate::controller::ApprovalHandler;
use crate::error::{ApprovalError, ApprovalResult};
use crate::request::{ApprovalDecision, ApprovalRequest, RememberScope, RequestId, RiskLevel};

/// The `approved` field of an `approvalResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawAnswer", into = "RawAnswer")]
pub enum ApprovalAnswer {
    /// `true`: approve once.
    Approve,
    /// `false`: deny.
    Deny,
    /// `"session"`: approve and remember for the session.
    Session,
    /// `"always"`: persisted by the UI layer; treated as a session approval here.
    Always,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    Flag(bool),
    Scope(ScopeWord),
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ScopeWord {
    Session,
    Always,
}

impl From<RawAnswer> for ApprovalAnswer {
    fn from(raw: RawAnswer) -> Self {
        match raw {
            RawAnswer::Flag(true) => Self::Approve,
            RawAnswer::Flag(false) => Self::Deny,
            RawAnswer::Scope(ScopeWord::Session) => Self::Session,
            RawAnswer::Scope(ScopeWord::Always) => Self::Always,
        }
    }
}

impl From<ApprovalAnswer> for RawAnswer {
    fn from(answer: ApprovalAnswer) -> Self {
        match answer {
            ApprovalAnswer::Approve => Self::Flag(true),
            ApprovalAnswer::Deny => Self::Flag(false),
            ApprovalAnswer::Session => Self::Scope(ScopeWord::Session),
            ApprovalAnswer::Always => Self::Scope(ScopeWord::Always),
        }
    }
}

/// Approval traffic between the controller and a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ApprovalEvent {
    /// A tool call is waiting for the user.
    #[serde(rename_all = "camelCase")]
    ApprovalRequired {
        /// Correlates the response.
        request_id: RequestId,
        /// Tool name.
        #[serde(rename = "type")]
        kind: String,
        /// What the tool is about to do.
        description: String,
        /// Assessed risk.
        risk: RiskLevel,
    },
    /// The user's answer.
    #[serde(rename_all = "camelCase")]
    ApprovalResponse {
        /// The request being answered.
        request_id: RequestId,
        /// The answer.
        approved: ApprovalAnswer,
        /// Optional explanation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ApprovalEvent {
    /// The outbound event announcing `request`.
    #[must_use]
    pub fn required(request: &ApprovalRequest) -> Self {
        Self::ApprovalRequired {
            request_id: request.id.clone(),
            kind: request.tool_name.clone(),
            description: request.description.clone(),
            risk: request.risk,
        }
    }

    /// A response event.
    #[must_use]
    pub fn response(request_id: RequestId, approved: ApprovalAnswer, reason: Option<String>) -> Self {
        Self::ApprovalResponse {
            request_id,
            approved,
            reason,
        }
    }

    /// The request this event concerns.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::ApprovalRequired { request_id, .. } | Self::ApprovalResponse { request_id, .. } => request_id,
        }
    }

    /// Translate a response into a core decision; `None` for other events.
    ///
    /// `"always"` becomes a session approval: persisting it across sessions
    /// is the UI's business.
    #[must_use]
    pub fn into_decision(self) -> Option<ApprovalDecision> {
        match self {
            Self::ApprovalResponse { approved, reason, .. } => Some(match approved {
                ApprovalAnswer::Approve => ApprovalDecision::approve_once(),
                ApprovalAnswer::Session | ApprovalAnswer::Always => ApprovalDecision::Approved {
                    remember: RememberScope::Session,
                },
                ApprovalAnswer::Deny => ApprovalDecision::Denied { note: reason },
            }),
            Self::ApprovalRequired { .. } => None,
        }
    }
}

/// An [`ApprovalHandler`] that talks to a UI over channels.
///
/// Each request is sent as `approvalRequired`; the handler then waits for the
/// `approvalResponse` carrying the same request id. Responses for other ids
/// are logged and dropped.
#[derive(Debug)]
pub struct ChannelApprovalHandler {
    outbound: mpsc::Sender<ApprovalEvent>,
    inbound: Mutex<mpsc::Receiver<ApprovalEvent>>,
}

impl ChannelApprovalHandler {
    /// Wire the handler to a UI.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<ApprovalEvent>, inbound: mpsc::Receiver<ApprovalEvent>) -> Self {
        Self {
            outbound,
            inbound: Mutex::new(inbound),
        }
    }
}

#[async_trait]
impl ApprovalHandler for ChannelApprovalHandler {
    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalResult<ApprovalDecision> {
        let id = request.id.clone();
        self.outbound
            .send(ApprovalEvent::required(&request))
            .await
            .map_err(|_| ApprovalError::ChannelClosed)?;

        let mut inbound = self.inbound.lock().await;
        loop {
            let event = inbound.recv().await.ok_or(ApprovalError::ChannelClosed)?;
            if event.request_id() != &id {
                tracing::warn!(expected = %id, got = %event.request_id(), "Ignoring approval event for another request");
                continue;
            }
            match event.into_decision() {
                Some(decision) => return Ok(decision),
                None => tracing::warn!(request_id = %id, "Ignoring non-response approval event"),
            }
        }
    }
}
