//! Shared test harness for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use bulwark_approval::{ApprovalDecision, ApprovalHandler, ApprovalRequest, ApprovalResult};
use bulwark_config::{Config, MountSection};
use bulwark_tools::{
    ApprovedExecutor, ToolCall, ToolContext, WorkerEnvironment, WorkerInvocation, WorkerOutput, WorkerRunner,
};
use bulwark_vfs::MemoryBackend;
use serde_json::Value;

/// Handler that answers from a script and records every request it sees.
///
/// Once the script runs out it approves once.
#[derive(Default)]
pub struct ScriptedHandler {
    script: Mutex<VecDeque<ApprovalDecision>>,
    seen: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedHandler {
    pub fn new(script: impl IntoIterator<Item = ApprovalDecision>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn approving() -> Arc<Self> {
        Self::new([])
    }

    /// Number of prompts the user would have seen.
    pub fn prompts(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// `(tool_name, description)` of every prompt, in order.
    pub fn prompted(&self) -> Vec<(String, String)> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.tool_name.clone(), r.description.clone()))
            .collect()
    }
}

#[async_trait::async_trait]
impl ApprovalHandler for ScriptedHandler {
    async fn request_approval(&self, request: ApprovalRequest) -> ApprovalResult<ApprovalDecision> {
        self.seen.lock().unwrap().push(request);
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(ApprovalDecision::approve_once))
    }
}

/// Runs delegated workers by replaying a fixed list of tool calls per worker
/// name through the session's executor, in the worker's own context.
///
/// The worker's answer is the JSON array of its calls' LLM payloads.
#[derive(Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, Vec<ToolCall>>>,
    executor: OnceLock<ApprovedExecutor>,
    /// `(chain, root, readonly)` of each started worker.
    pub started: Mutex<Vec<(String, String, bool)>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, worker: &str, calls: Vec<ToolCall>) {
        self.scripts.lock().unwrap().insert(worker.to_owned(), calls);
    }

    /// Hand the runner the executor it should run worker calls through.
    pub fn attach(&self, executor: &ApprovedExecutor) {
        let _ = self.executor.set(executor.clone());
    }
}

#[async_trait::async_trait]
impl WorkerRunner for ScriptedRunner {
    async fn run(&self, invocation: WorkerInvocation, _caller: &ToolContext) -> Result<WorkerOutput, String> {
        let executor = self.executor.get().ok_or("runner not attached")?;
        let config = invocation.sandbox.config();
        self.started
            .lock()
            .unwrap()
            .push((invocation.delegation.chain(), config.root.clone(), config.readonly));

        let calls = self
            .scripts
            .lock()
            .unwrap()
            .get(&invocation.worker)
            .cloned()
            .ok_or_else(|| format!("no worker named '{}'", invocation.worker))?;

        let ctx = invocation.tool_context();
        let outcomes = executor.execute_batch(&calls, &ctx).await;
        let payload: Vec<Value> = outcomes.iter().map(|o| o.to_llm_value()).collect();
        Ok(WorkerOutput {
            output: Value::Array(payload).to_string(),
        })
    }
}

/// Interactive config rooted at `/proj` with `/docs` (read-only) and
/// `/scratch` mounts.
pub fn config() -> Config {
    let mut cfg = Config::default();
    cfg.sandbox.root = "/proj".to_owned();
    cfg.sandbox.mounts = vec![
        MountSection {
            source: "/shared/docs".to_owned(),
            target: "/docs".to_owned(),
            readonly: true,
        },
        MountSection {
            source: "/tmp/scratch".to_owned(),
            target: "/scratch".to_owned(),
            readonly: false,
        },
    ];
    cfg
}

/// An in-memory environment answering approvals through `handler`.
pub fn environment(config: &Config, handler: Arc<ScriptedHandler>) -> WorkerEnvironment {
    WorkerEnvironment::builder(config)
        .with_backend(Arc::new(MemoryBackend::new()))
        .with_handler(handler)
        .build()
        .unwrap()
}

/// Like [`environment`], with `call_worker` backed by `runner`.
pub fn delegating_environment(
    config: &Config,
    handler: Arc<ScriptedHandler>,
    runner: &Arc<ScriptedRunner>,
) -> WorkerEnvironment {
    let env = WorkerEnvironment::builder(config)
        .with_backend(Arc::new(MemoryBackend::new()))
        .with_handler(handler)
        .with_runner(runner.clone())
        .build()
        .unwrap();
    runner.attach(env.executor());
    env
}

pub fn call(name: &str, args: Value) -> ToolCall {
    ToolCall::new(format!("call-{name}"), name, args)
}

/// The `error` text of a non-success outcome.
pub fn error_text(value: &Value) -> &str {
    value["error"].as_str().unwrap_or_default()
}
