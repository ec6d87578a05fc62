//! The `call_worker` tool: delegate a task to another worker.
//!
//! `bulwark-tools` defines [`WorkerRunner`]; whatever drives the LLM loop
//! implements it. Setup (depth check, sandbox restriction) happens here and
//! fails before the runner is ever called.

use std::sync::Arc;

use bulwark_approval::{ApprovalController, RiskLevel};
use bulwark_vfs::{Sandbox, SandboxRestriction};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{
    ApprovalDescription, ApprovalRequirement, DelegationContext, NeedsApproval, ToolContext, ToolDefinition,
    ToolError, ToolResult, Toolset, WorkerIdentity,
};

/// Name of the delegation tool.
pub const CALL_WORKER: &str = "call_worker";

/// Arguments of `call_worker`.
#[derive(Debug, Clone, Deserialize)]
struct CallWorkerArgs {
    worker: String,
    input: String,
    #[serde(default)]
    sandbox: Option<SandboxRestriction>,
}

/// Everything a delegated worker runs with.
#[derive(Debug)]
pub struct WorkerInvocation {
    /// Worker definition name.
    pub worker: String,
    /// Task input for the worker.
    pub input: String,
    /// The worker's (restricted) sandbox.
    pub sandbox: Sandbox,
    /// The caller's approval controller.
    pub approvals: Arc<ApprovalController>,
    /// The worker's place in the delegation chain.
    pub delegation: DelegationContext,
    /// Cancelled when the caller is cancelled.
    pub cancel: CancellationToken,
}

impl WorkerInvocation {
    /// A tool context for the delegated worker's own tool calls.
    #[must_use]
    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(
            self.sandbox.clone(),
            self.delegation.clone(),
            Arc::clone(&self.approvals),
            self.cancel.clone(),
        )
    }
}

/// What a delegated worker produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutput {
    /// The worker's final answer.
    pub output: String,
}

/// Runs a delegated worker to completion.
#[async_trait::async_trait]
pub trait WorkerRunner: Send + Sync {
    /// Run `invocation`. `caller` is the calling worker's context; text
    /// appended to it is preserved if the call is interrupted.
    async fn run(&self, invocation: WorkerInvocation, caller: &ToolContext) -> Result<WorkerOutput, String>;
}

/// Provides `call_worker`.
pub struct WorkerToolset {
    runner: Arc<dyn WorkerRunner>,
}

impl WorkerToolset {
    /// Delegate through `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn WorkerRunner>) -> Self {
        Self { runner }
    }

    /// Compute the child's delegation context and sandbox.
    fn prepare(&self, args: CallWorkerArgs, ctx: &ToolContext) -> ToolResult<WorkerInvocation> {
        let delegation = ctx.delegation.child(WorkerIdentity::new(&args.worker))?;
        let restriction = args.sandbox.unwrap_or_default();
        let sandbox = ctx.sandbox.restrict(&restriction)?;
        Ok(WorkerInvocation {
            worker: args.worker,
            input: args.input,
            sandbox,
            approvals: Arc::clone(&ctx.approvals),
            delegation,
            cancel: ctx.cancel.child_token(),
        })
    }
}

impl std::fmt::Debug for WorkerToolset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerToolset").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Toolset for WorkerToolset {
    fn name(&self) -> &str {
        "workers"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            CALL_WORKER,
            "Delegate a task to another worker. The worker runs in the same or a narrower sandbox \
             and returns its final answer.",
            json!({
                "type": "object",
                "properties": {
                    "worker": { "type": "string", "description": "Name of the worker to call" },
                    "input": { "type": "string", "description": "Task for the worker" },
                    "sandbox": {
                        "type": "object",
                        "description": "Optional narrowing of the worker's sandbox",
                        "properties": {
                            "restrict": { "type": "string", "description": "Virtual path that becomes the worker's root" },
                            "readonly": { "type": "boolean", "description": "Make the worker's sandbox read-only" }
                        }
                    }
                },
                "required": ["worker", "input"]
            }),
        )]
    }

    async fn call(&self, tool_name: &str, args: &Value, ctx: &ToolContext) -> ToolResult<Value> {
        if tool_name != CALL_WORKER {
            return Err(ToolError::UnknownTool(tool_name.to_owned()));
        }
        let args: CallWorkerArgs =
            serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let invocation = self.prepare(args, ctx)?;
        let worker = invocation.worker.clone();

        tracing::info!(
            worker = %worker,
            chain = %invocation.delegation.chain(),
            depth = invocation.delegation.depth(),
            root = %invocation.sandbox.config().root,
            readonly = invocation.sandbox.config().readonly,
            "Spawning worker"
        );

        let result = self
            .runner
            .run(invocation, ctx)
            .await
            .map_err(|message| ToolError::Worker {
                worker: worker.clone(),
                message,
            })?;
        Ok(json!({ "worker": worker, "output": result.output }))
    }

    fn needs_approval(&self) -> Option<&dyn NeedsApproval> {
        Some(self)
    }

    fn approval_description(&self) -> Option<&dyn ApprovalDescription> {
        Some(self)
    }
}

impl NeedsApproval for WorkerToolset {
    fn approval_requirement(&self, _tool_name: &str, _args: &Value, _ctx: &ToolContext) -> ApprovalRequirement {
        ApprovalRequirement::Required
    }
}

impl ApprovalDescription for WorkerToolset {
    fn describe(&self, _tool_name: &str, args: &Value) -> String {
        let worker = args.get("worker").and_then(Value::as_str).unwrap_or("<unnamed>");
        format!("Call worker '{worker}'")
    }

    fn risk(&self, _tool_name: &str, _args: &Value) -> RiskLevel {
        RiskLevel::High
    }
}
