//! Approval-gated tool execution.
//!
//! Every call goes through the same pipeline:
//!
//! 1. The providing toolset classifies the call through its
//!    [`NeedsApproval`](crate::NeedsApproval) capability (no capability means
//!    every call needs approval).
//! 2. `Blocked` calls return a structured denial; the controller is never asked.
//! 3. `Required` calls are sent to the [`ApprovalController`]; a denial is
//!    returned as text, not as an error.
//! 4. Approved and pre-approved calls run against the context's sandbox.
//!
//! Cancellation of the context's token interrupts the approval wait or the
//! running tool and yields [`ToolOutcome::Interrupted`].

use std::sync::Arc;

use bulwark_approval::{ApprovalController, ApprovalRequest, RiskLevel};
use tracing::{debug, info, warn};

use crate::{ApprovalRequirement, ToolCall, ToolContext, ToolError, ToolOutcome, ToolRegistry, Toolset};

/// Runs tool calls through the approval pipeline.
#[derive(Debug, Clone)]
pub struct ApprovedExecutor {
    registry: Arc<ToolRegistry>,
    approvals: Arc<ApprovalController>,
}

impl ApprovedExecutor {
    /// Create an executor over `registry`, asking `approvals`.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, approvals: Arc<ApprovalController>) -> Self {
        Self { registry, approvals }
    }

    /// The tools this executor dispatches to.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// The controller consulted for `Required` calls.
    #[must_use]
    pub fn approvals(&self) -> &Arc<ApprovalController> {
        &self.approvals
    }

    /// Execute one call.
    ///
    /// Never fails: every way a call can end is a [`ToolOutcome`] for the LLM.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutcome {
        if ctx.cancel.is_cancelled() {
            return ToolOutcome::Interrupted {
                partial_output: String::new(),
            };
        }

        let Some(toolset) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, "Call to unknown tool");
            return ToolOutcome::failed(&ToolError::UnknownTool(call.name.clone()));
        };

        // Output left over from a previous call must not leak into this one.
        ctx.take_output();

        let requirement = toolset
            .needs_approval()
            .map_or(ApprovalRequirement::Required, |policy| {
                policy.approval_requirement(&call.name, &call.args, ctx)
            });
        debug!(tool = %call.name, requirement = ?requirement, "Classified tool call");

        let pre_approved = match requirement {
            ApprovalRequirement::Blocked { reason, code, hint } => {
                warn!(tool = %call.name, reason = %reason, code, "Tool call blocked");
                return ToolOutcome::Blocked {
                    error: format!("Operation blocked: {reason}"),
                    code: code.to_owned(),
                    hint: hint.map(str::to_owned),
                };
            },
            ApprovalRequirement::PreApproved => true,
            ApprovalRequirement::Required => {
                if let Some(outcome) = self.ask(toolset.as_ref(), call, ctx).await {
                    return outcome;
                }
                false
            },
        };

        self.run(toolset.as_ref(), call, ctx, pre_approved).await
    }

    /// Execute calls one after another, in order.
    ///
    /// Once a call is interrupted the remaining calls are reported as
    /// interrupted without running.
    pub async fn execute_batch(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<ToolOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        let mut interrupted = false;
        for call in calls {
            if interrupted {
                outcomes.push(ToolOutcome::Interrupted {
                    partial_output: String::new(),
                });
                continue;
            }
            let outcome = self.execute(call, ctx).await;
            interrupted = outcome.is_interrupted();
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Ask the controller. `None` means approved.
    async fn ask(&self, toolset: &dyn Toolset, call: &ToolCall, ctx: &ToolContext) -> Option<ToolOutcome> {
        let (description, risk) = match toolset.approval_description() {
            Some(describer) => (
                describer.describe(&call.name, &call.args),
                describer.risk(&call.name, &call.args),
            ),
            None => (format!("Execute tool: {}", call.name), RiskLevel::Medium),
        };
        let request = ApprovalRequest::new(call.name.clone(), call.args.clone(), description).with_risk(risk);

        let result = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                info!(tool = %call.name, "Approval wait interrupted");
                return Some(ToolOutcome::Interrupted {
                    partial_output: ctx.take_output(),
                });
            },
            result = self.approvals.request_approval(request) => result,
        };

        match result {
            Ok(decision) if decision.is_approved() => None,
            Ok(decision) => {
                let error = match decision.note() {
                    Some(note) => format!("Operation denied: {note}"),
                    None => "Operation denied by user".to_owned(),
                };
                Some(ToolOutcome::Denied { error })
            },
            Err(e) => Some(ToolOutcome::failed(&ToolError::Approval(e))),
        }
    }

    async fn run(&self, toolset: &dyn Toolset, call: &ToolCall, ctx: &ToolContext, pre_approved: bool) -> ToolOutcome {
        debug!(tool = %call.name, toolset = toolset.name(), pre_approved, "Executing tool");

        let result = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                info!(tool = %call.name, "Tool call interrupted");
                return ToolOutcome::Interrupted {
                    partial_output: ctx.take_output(),
                };
            },
            result = toolset.call(&call.name, &call.args, ctx) => result,
        };

        match result {
            Ok(output) => ToolOutcome::Success { output, pre_approved },
            Err(e) => {
                debug!(tool = %call.name, code = e.code(), error = %e, "Tool call failed");
                ToolOutcome::failed(&e)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ApprovalDescription, DelegationContext, FilesystemToolset, NeedsApproval, ToolDefinition, ToolResult,
        WorkerIdentity,
    };
    use bulwark_approval::{ApprovalDecision, ApprovalHandler, ApprovalMode, ApprovalResult};
    use bulwark_vfs::{MemoryBackend, MountConfig, Sandbox, SandboxConfig};
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Replays scripted decisions and records every request.
    struct Scripted {
        decisions: Mutex<Vec<ApprovalDecision>>,
        seen: Mutex<Vec<ApprovalRequest>>,
    }

    impl Scripted {
        fn new(decisions: Vec<ApprovalDecision>) -> Arc<Self> {
            Arc::new(Self {
                decisions: Mutex::new(decisions),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl ApprovalHandler for Scripted {
        async fn request_approval(&self, request: ApprovalRequest) -> ApprovalResult<ApprovalDecision> {
            self.seen.lock().unwrap().push(request);
            let mut decisions = self.decisions.lock().unwrap();
            Ok(if decisions.is_empty() {
                ApprovalDecision::deny("script exhausted")
            } else {
                decisions.remove(0)
            })
        }
    }

    /// A handler that never answers.
    struct Silent;

    #[async_trait::async_trait]
    impl ApprovalHandler for Silent {
        async fn request_approval(&self, _request: ApprovalRequest) -> ApprovalResult<ApprovalDecision> {
            std::future::pending().await
        }
    }

    /// Emits some output, then waits until cancelled.
    struct Stuck {
        runs: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Toolset for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::new("stuck", "never finishes", json!({"type": "object"}))]
        }

        async fn call(&self, _tool_name: &str, _args: &Value, ctx: &ToolContext) -> ToolResult<Value> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            ctx.append_output("halfway");
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }

        fn needs_approval(&self) -> Option<&dyn NeedsApproval> {
            Some(self)
        }
    }

    impl NeedsApproval for Stuck {
        fn approval_requirement(&self, _tool_name: &str, _args: &Value, _ctx: &ToolContext) -> ApprovalRequirement {
            ApprovalRequirement::PreApproved
        }
    }

    /// No capabilities at all.
    struct Plain;

    #[async_trait::async_trait]
    impl Toolset for Plain {
        fn name(&self) -> &str {
            "plain"
        }

        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::new("shout", "uppercase text", json!({"type": "object"}))]
        }

        async fn call(&self, _tool_name: &str, args: &Value, _ctx: &ToolContext) -> ToolResult<Value> {
            let text = crate::toolset::str_arg(args, "text")?;
            Ok(json!(text.to_uppercase()))
        }
    }

    fn sandbox() -> Sandbox {
        Sandbox::new(
            SandboxConfig::new("/proj").with_mount(MountConfig::new("/docs", "/docs").read_only()),
            Arc::new(MemoryBackend::new()),
        )
        .unwrap()
    }

    fn setup(controller: ApprovalController) -> (ApprovedExecutor, ToolContext) {
        let registry = ToolRegistry::new()
            .with(Arc::new(FilesystemToolset::new()))
            .unwrap()
            .with(Arc::new(Plain))
            .unwrap()
            .with(Arc::new(Stuck {
                runs: AtomicUsize::new(0),
            }))
            .unwrap();
        let approvals = Arc::new(controller);
        let ctx = ToolContext::new(
            sandbox(),
            DelegationContext::root(WorkerIdentity::new("main"), 2),
            Arc::clone(&approvals),
            CancellationToken::new(),
        );
        (ApprovedExecutor::new(Arc::new(registry), approvals), ctx)
    }

    fn interactive(handler: Arc<dyn ApprovalHandler>) -> ApprovalController {
        ApprovalController::new(ApprovalMode::Interactive).with_handler(handler)
    }

    #[tokio::test]
    async fn test_approved_write_runs() {
        let handler = Scripted::new(vec![ApprovalDecision::approve_once()]);
        let (exec, ctx) = setup(interactive(handler.clone()));

        let call = ToolCall::new("1", "write_file", json!({"path": "/out.md", "content": "hi"}));
        let outcome = exec.execute(&call, &ctx).await;
        assert_eq!(
            outcome,
            ToolOutcome::Success {
                output: json!({"path": "/out.md", "bytes": 2}),
                pre_approved: false,
            }
        );
        assert_eq!(ctx.sandbox.read("/out.md").await.unwrap(), "hi");

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen[0].description, "Write 2 bytes to /out.md");
        assert_eq!(seen[0].tool_name, "write_file");
    }

    #[tokio::test]
    async fn test_denial_is_text() {
        let handler = Scripted::new(vec![
            ApprovalDecision::deny("too risky"),
            ApprovalDecision::Denied { note: None },
        ]);
        let (exec, ctx) = setup(interactive(handler));
        let call = ToolCall::new("1", "delete_file", json!({"path": "/a"}));

        let outcome = exec.execute(&call, &ctx).await;
        assert_eq!(
            outcome.to_llm_value(),
            json!({"success": false, "error": "Operation denied: too risky"})
        );
        let outcome = exec.execute(&call, &ctx).await;
        assert_eq!(
            outcome,
            ToolOutcome::Denied {
                error: "Operation denied by user".into()
            }
        );
    }

    #[tokio::test]
    async fn test_blocked_skips_controller() {
        let handler = Scripted::new(vec![ApprovalDecision::approve_once()]);
        let (exec, ctx) = setup(interactive(handler.clone()));

        let call = ToolCall::new("1", "write_file", json!({"path": "/docs/a.md", "content": "x"}));
        let outcome = exec.execute(&call, &ctx).await;
        assert!(matches!(outcome, ToolOutcome::Blocked { ref error, .. } if error.starts_with("Operation blocked: ")));
        assert_eq!(handler.calls(), 0);
        assert!(!ctx.sandbox.exists("/docs/a.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_blocked_keeps_code_and_hint() {
        let handler = Scripted::new(vec![]);
        let (exec, ctx) = setup(interactive(handler.clone()));

        let read_only = exec
            .execute(
                &ToolCall::new("1", "write_file", json!({"path": "/docs/a.md", "content": "x"})),
                &ctx,
            )
            .await
            .to_llm_value();
        assert_eq!(read_only["success"], false);
        assert_eq!(read_only["code"], "READ_ONLY");
        assert_eq!(read_only["error"], "Operation blocked: Path is read-only: /docs/a.md");
        assert!(read_only["hint"].as_str().is_some_and(|h| !h.is_empty()));

        let escape = exec
            .execute(&ToolCall::new("2", "delete_file", json!({"path": "/../etc"})), &ctx)
            .await
            .to_llm_value();
        assert_eq!(escape["code"], "INVALID_PATH");
        assert!(escape["hint"].is_string());

        let missing = exec
            .execute(&ToolCall::new("3", "make_dir", json!({})), &ctx)
            .await
            .to_llm_value();
        assert_eq!(missing["code"], "INVALID_ARGUMENTS");
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_pre_approved_read() {
        let handler = Scripted::new(vec![]);
        let (exec, ctx) = setup(interactive(handler.clone()));
        ctx.sandbox.write("/notes.md", "n").await.unwrap();

        let outcome = exec
            .execute(&ToolCall::new("1", "read_file", json!({"path": "/notes.md"})), &ctx)
            .await;
        assert!(matches!(outcome, ToolOutcome::Success { pre_approved: true, .. }));
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_default_policy_and_description() {
        let handler = Scripted::new(vec![ApprovalDecision::approve_once()]);
        let (exec, ctx) = setup(interactive(handler.clone()));
        let outcome = exec
            .execute(&ToolCall::new("1", "shout", json!({"text": "hey"})), &ctx)
            .await;
        assert_eq!(
            outcome,
            ToolOutcome::Success {
                output: json!("HEY"),
                pre_approved: false
            }
        );
        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen[0].description, "Execute tool: shout");
        assert_eq!(seen[0].risk, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_errors_are_results() {
        let (exec, ctx) = setup(ApprovalController::new(ApprovalMode::ApproveAll));

        let outcome = exec.execute(&ToolCall::new("1", "format_disk", json!({})), &ctx).await;
        assert!(matches!(outcome, ToolOutcome::Failed { ref code, .. } if code == "UNKNOWN_TOOL"));

        let outcome = exec
            .execute(&ToolCall::new("2", "read_file", json!({"path": "/nope"})), &ctx)
            .await;
        let value = outcome.to_llm_value();
        assert_eq!(value["code"], "NOT_FOUND");
        assert_eq!(value["error"], "Not found: /nope");
    }

    #[tokio::test]
    async fn test_session_approval_reused() {
        let handler = Scripted::new(vec![ApprovalDecision::approve_for_session()]);
        let (exec, ctx) = setup(interactive(handler.clone()));
        let call = ToolCall::new("1", "write_file", json!({"path": "/a", "content": "x"}));

        assert!(exec.execute(&call, &ctx).await.is_success());
        assert!(exec.execute(&call, &ctx).await.is_success());
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_batch_is_sequential() {
        let handler = Scripted::new(vec![
            ApprovalDecision::approve_once(),
            ApprovalDecision::deny("no"),
            ApprovalDecision::approve_once(),
        ]);
        let (exec, ctx) = setup(interactive(handler.clone()));
        let calls = vec![
            ToolCall::new("1", "write_file", json!({"path": "/1", "content": "a"})),
            ToolCall::new("2", "write_file", json!({"path": "/2", "content": "b"})),
            ToolCall::new("3", "write_file", json!({"path": "/3", "content": "c"})),
        ];
        let outcomes = exec.execute_batch(&calls, &ctx).await;
        assert!(outcomes[0].is_success());
        assert!(matches!(outcomes[1], ToolOutcome::Denied { .. }));
        assert!(outcomes[2].is_success());

        let order: Vec<_> = handler
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.tool_args["path"].clone())
            .collect();
        assert_eq!(order, vec![json!("/1"), json!("/2"), json!("/3")]);
        assert!(!ctx.sandbox.exists("/2").await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_during_tool_keeps_partial_output() {
        let (exec, ctx) = setup(ApprovalController::new(ApprovalMode::ApproveAll));
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let calls = vec![
            ToolCall::new("1", "stuck", json!({})),
            ToolCall::new("2", "write_file", json!({"path": "/after", "content": "x"})),
        ];
        let outcomes = exec.execute_batch(&calls, &ctx).await;
        assert_eq!(
            outcomes,
            vec![
                ToolOutcome::Interrupted {
                    partial_output: "halfway".into()
                },
                ToolOutcome::Interrupted {
                    partial_output: String::new()
                },
            ]
        );
        assert!(!ctx.sandbox.exists("/after").await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_during_approval_frees_controller() {
        let (exec, ctx) = setup(interactive(Arc::new(Silent)));
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let call = ToolCall::new("1", "write_file", json!({"path": "/a", "content": "x"}));
        let outcome = exec.execute(&call, &ctx).await;
        assert!(outcome.is_interrupted());
        assert!(!exec.approvals().is_pending());
    }

    #[tokio::test]
    async fn test_concurrent_approval_is_failed_result() {
        let (exec, ctx) = setup(interactive(Arc::new(Silent)));
        let exec2 = exec.clone();
        let approvals = Arc::clone(exec.approvals());

        let first = tokio::spawn(async move {
            let ctx = ToolContext::new(
                sandbox(),
                DelegationContext::root(WorkerIdentity::new("other"), 1),
                approvals,
                CancellationToken::new(),
            );
            let call = ToolCall::new("1", "write_file", json!({"path": "/a", "content": "x"}));
            exec2.execute(&call, &ctx).await
        });
        while !exec.approvals().is_pending() {
            tokio::task::yield_now().await;
        }

        let call = ToolCall::new("2", "write_file", json!({"path": "/b", "content": "y"}));
        let outcome = exec.execute(&call, &ctx).await;
        assert!(matches!(outcome, ToolOutcome::Failed { ref code, .. } if code == "APPROVAL_ERROR"));
        first.abort();
    }

    #[tokio::test]
    async fn test_description_capability_used() {
        struct Described;

        impl ApprovalDescription for Described {
            fn describe(&self, _tool_name: &str, _args: &Value) -> String {
                "custom".into()
            }

            fn risk(&self, _tool_name: &str, _args: &Value) -> RiskLevel {
                RiskLevel::Critical
            }
        }

        #[async_trait::async_trait]
        impl Toolset for Described {
            fn name(&self) -> &str {
                "described"
            }

            fn definitions(&self) -> Vec<ToolDefinition> {
                vec![ToolDefinition::new("described", "d", json!({}))]
            }

            async fn call(&self, _tool_name: &str, _args: &Value, _ctx: &ToolContext) -> ToolResult<Value> {
                Ok(Value::Null)
            }

            fn approval_description(&self) -> Option<&dyn ApprovalDescription> {
                Some(self)
            }
        }

        let handler = Scripted::new(vec![ApprovalDecision::approve_once()]);
        let approvals = Arc::new(interactive(handler.clone()));
        let registry = ToolRegistry::new().with(Arc::new(Described)).unwrap();
        let exec = ApprovedExecutor::new(Arc::new(registry), Arc::clone(&approvals));
        let ctx = ToolContext::new(
            sandbox(),
            DelegationContext::root(WorkerIdentity::new("main"), 1),
            approvals,
            CancellationToken::new(),
        );
        assert!(exec.execute(&ToolCall::new("1", "described", Value::Null), &ctx).await.is_success());
        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen[0].description, "custom");
        assert_eq!(seen[0].risk, RiskLevel::Critical);
    }
}
