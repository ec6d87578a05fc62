//! Approval controller: decides whether a tool call may run.
//!
//! # Approval Flow
//!
//! 1. `approve_all` / `auto_deny` answer immediately
//! 2. Claim the single pending slot (a second concurrent request is rejected)
//! 3. Return a cached session decision if one matches
//! 4. Otherwise ask the [`ApprovalHandler`] and remember session approvals

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{ApprovalError, ApprovalResult};
use crate::memory::ApprovalMemory;
use crate::request::{ApprovalDecision, ApprovalRequest};

/// Note attached to every decision made in auto-deny mode.
const AUTO_DENY_NOTE: &str = "auto-deny mode";

/// How a controller answers requests, fixed for its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Ask the user (through the handler) unless a session decision applies.
    #[default]
    Interactive,
    /// Approve everything without asking.
    ApproveAll,
    /// Deny everything without asking.
    AutoDeny,
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interactive => "interactive",
            Self::ApproveAll => "approve_all",
            Self::AutoDeny => "auto_deny",
        })
    }
}

impl FromStr for ApprovalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interactive" => Ok(Self::Interactive),
            "approve_all" => Ok(Self::ApproveAll),
            "auto_deny" => Ok(Self::AutoDeny),
            other => Err(format!(
                "unknown approval mode '{other}' (expected interactive, approve_all or auto_deny)"
            )),
        }
    }
}

/// Presents approval requests to the user.
///
/// Different frontends (terminal, web UI, tests) implement this trait.
///
/// # Example
///
/// ```rust,ignore
/// use bulwark_approval::{ApprovalDecision, ApprovalHandler, ApprovalRequest, ApprovalResult};
///
/// struct AlwaysYes;
///
/// #[async_trait::async_trait]
/// impl ApprovalHandler for AlwaysYes {
///     async fn request_approval(&self, _request: ApprovalRequest) -> ApprovalResult<ApprovalDecision> {
///         Ok(ApprovalDecision::approve_once())
///     }
/// }
/// ```
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Show the request and wait for the user's decision.
    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalResult<ApprovalDecision>;
}

/// Clears the pending flag when the request finishes or its future is dropped.
struct PendingGuard<'a>(&'a AtomicBool);

impl<'a> PendingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Decides, caches and serializes approval requests for one session.
pub struct ApprovalController {
    mode: ApprovalMode,
    memory: ApprovalMemory,
    handler: RwLock<Option<Arc<dyn ApprovalHandler>>>,
    pending: AtomicBool,
}

impl ApprovalController {
    /// Create a controller with no handler registered.
    #[must_use]
    pub fn new(mode: ApprovalMode) -> Self {
        Self {
            mode,
            memory: ApprovalMemory::new(),
            handler: RwLock::new(None),
            pending: AtomicBool::new(false),
        }
    }

    /// Builder-style handler registration.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.handler = RwLock::new(Some(handler));
        self
    }

    /// Register (or replace) the approval handler.
    pub async fn register_handler(&self, handler: Arc<dyn ApprovalHandler>) {
        *self.handler.write().await = Some(handler);
    }

    /// The mode chosen at construction.
    #[must_use]
    pub fn mode(&self) -> ApprovalMode {
        self.mode
    }

    /// The session decision cache.
    #[must_use]
    pub fn memory(&self) -> &ApprovalMemory {
        &self.memory
    }

    /// Forget all session decisions.
    pub fn clear_session(&self) {
        self.memory.clear();
    }

    /// Whether a request is currently awaiting a decision.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Obtain a decision for `request`.
    ///
    /// The handler call is the only suspension point. Dropping the returned
    /// future frees the pending slot.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::ConcurrentRequest`] if another request is
    /// still pending, or whatever the handler fails with.
    pub async fn request_approval(&self, request: ApprovalRequest) -> ApprovalResult<ApprovalDecision> {
        match self.mode {
            ApprovalMode::ApproveAll => {
                tracing::debug!(tool = %request.tool_name, "Approved by approve_all mode");
                return Ok(ApprovalDecision::approve_once());
            },
            ApprovalMode::AutoDeny => {
                tracing::warn!(tool = %request.tool_name, "Denied by auto_deny mode");
                return Ok(ApprovalDecision::deny(AUTO_DENY_NOTE));
            },
            ApprovalMode::Interactive => {},
        }

        let Some(_pending) = PendingGuard::acquire(&self.pending) else {
            tracing::error!(
                tool = %request.tool_name,
                request_id = %request.id,
                "Concurrent approval request rejected; approvals must be resolved one at a time"
            );
            return Err(ApprovalError::ConcurrentRequest {
                tool: request.tool_name,
            });
        };

        if let Some(decision) = self.memory.lookup(&request.tool_name, &request.tool_args) {
            tracing::debug!(tool = %request.tool_name, "Approval served from session memory");
            return Ok(decision);
        }

        let handler = self.handler.read().await.as_ref().map(Arc::clone);
        let Some(handler) = handler else {
            tracing::warn!(tool = %request.tool_name, "No approval handler registered, denying");
            return Ok(ApprovalDecision::deny("no approval handler registered"));
        };

        let tool_name = request.tool_name.clone();
        let tool_args = request.tool_args.clone();
        let decision = handler.request_approval(request).await?;

        match &decision {
            ApprovalDecision::Approved { remember } => {
                tracing::info!(tool = %tool_name, ?remember, "Tool call approved");
                self.memory.store(&tool_name, &tool_args, decision.clone());
            },
            ApprovalDecision::Denied { note } => {
                tracing::warn!(tool = %tool_name, note = note.as_deref().unwrap_or(""), "Tool call denied");
            },
        }
        Ok(decision)
    }
}

impl fmt::Debug for ApprovalController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalController")
            .field("mode", &self.mode)
            .field("memory", &self.memory)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}
