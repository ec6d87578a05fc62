use std::sync::{Arc, Mutex, MutexGuard};

use bulwark_approval::ApprovalController;
use bulwark_vfs::Sandbox;
use tokio_util::sync::CancellationToken;

use crate::delegation::DelegationContext;

/// Everything a tool call can see.
///
/// One context per running worker. The output buffer collects text a tool
/// emits while running so it can be returned if the call is interrupted.
pub struct ToolContext {
    /// The worker's sandbox.
    pub sandbox: Sandbox,
    /// Where the worker sits in the delegation chain.
    pub delegation: DelegationContext,
    /// The session's approval controller, shared with delegated workers.
    pub approvals: Arc<ApprovalController>,
    /// Cancels the in-flight tool call or approval wait.
    pub cancel: CancellationToken,
    output: Mutex<String>,
}

impl ToolContext {
    /// Create a context.
    #[must_use]
    pub fn new(
        sandbox: Sandbox,
        delegation: DelegationContext,
        approvals: Arc<ApprovalController>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sandbox,
            delegation,
            approvals,
            cancel,
            output: Mutex::new(String::new()),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, String> {
        self.output.lock().unwrap_or_else(|e| {
            tracing::warn!("ToolContext output lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Record text emitted by the running tool.
    pub fn append_output(&self, text: &str) {
        self.buffer().push_str(text);
    }

    /// Text emitted so far by the running tool.
    #[must_use]
    pub fn partial_output(&self) -> String {
        self.buffer().clone()
    }

    /// Take and clear the emitted text.
    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.buffer())
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("sandbox", &self.sandbox)
            .field("delegation", &self.delegation.chain())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
