//! Bridge from `bulwark_config::Config` to the running pieces.
//!
//! `bulwark-config` knows nothing about sandboxes or controllers. This module
//! converts a loaded config into them exactly once, in one place.

use std::sync::Arc;

use bulwark_approval::{ApprovalController, ApprovalHandler, ApprovalMode};
use bulwark_config::Config;
use bulwark_telemetry::{LogConfig, LogFormat, TelemetryResult, setup_logging};
use bulwark_vfs::{Backend, HostBackend, MountConfig, Sandbox, SandboxConfig};
use tokio_util::sync::CancellationToken;

use crate::{
    ApprovedExecutor, DelegationContext, FilesystemToolset, ToolContext, ToolError, ToolRegistry, ToolResult,
    Toolset, WorkerIdentity, WorkerRunner, WorkerToolset,
};

/// Convert the `[sandbox]` section.
#[must_use]
pub fn to_sandbox_config(cfg: &Config) -> SandboxConfig {
    let s = &cfg.sandbox;
    SandboxConfig {
        root: s.root.clone(),
        readonly: s.readonly,
        mounts: s
            .mounts
            .iter()
            .map(|m| MountConfig {
                source: m.source.clone(),
                target: m.target.clone(),
                readonly: m.readonly,
            })
            .collect(),
    }
}

/// Convert `approval.mode`.
///
/// # Errors
///
/// Returns [`ToolError::Config`] for an unknown mode.
pub fn to_approval_mode(cfg: &Config) -> ToolResult<ApprovalMode> {
    cfg.approval.mode.parse().map_err(ToolError::Config)
}

/// Convert the `[tools]` section into the filesystem toolset's policy.
#[must_use]
pub fn to_filesystem_toolset(cfg: &Config) -> FilesystemToolset {
    FilesystemToolset::new()
        .with_read_approval(cfg.tools.require_approval_for_reads)
        .with_write_approval(cfg.tools.require_approval_for_writes)
}

/// Convert the `[logging]` section.
///
/// # Errors
///
/// Returns an error for an unknown log format.
pub fn to_log_config(cfg: &Config) -> TelemetryResult<LogConfig> {
    let format: LogFormat = cfg.logging.format.parse()?;
    Ok(cfg
        .logging
        .directives
        .iter()
        .fold(LogConfig::new(&cfg.logging.level).with_format(format), |log, d| {
            log.with_directive(d)
        }))
}

/// Install the global `tracing` subscriber described by the `[logging]`
/// section. Call once at startup, before building environments.
///
/// # Errors
///
/// Returns [`ToolError::Config`] for an unknown format, a bad directive, or
/// when a global subscriber is already installed.
pub fn init_logging(cfg: &Config) -> ToolResult<()> {
    let log = to_log_config(cfg).map_err(|e| ToolError::Config(e.to_string()))?;
    setup_logging(&log).map_err(|e| ToolError::Config(e.to_string()))
}

/// Everything a root worker needs, built from one [`Config`].
#[derive(Debug, Clone)]
pub struct WorkerEnvironment {
    sandbox: Sandbox,
    approvals: Arc<ApprovalController>,
    executor: ApprovedExecutor,
    max_depth: usize,
}

impl WorkerEnvironment {
    /// Start building an environment from `config`.
    #[must_use]
    pub fn builder(config: &Config) -> WorkerEnvironmentBuilder<'_> {
        WorkerEnvironmentBuilder {
            config,
            backend: None,
            handler: None,
            runner: None,
            toolsets: Vec::new(),
        }
    }

    /// The root sandbox.
    #[must_use]
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// The session's approval controller.
    #[must_use]
    pub fn approvals(&self) -> &Arc<ApprovalController> {
        &self.approvals
    }

    /// The executor every worker's calls go through.
    #[must_use]
    pub fn executor(&self) -> &ApprovedExecutor {
        &self.executor
    }

    /// A tool context for the root worker `name`.
    #[must_use]
    pub fn root_context(&self, name: &str) -> ToolContext {
        ToolContext::new(
            self.sandbox.clone(),
            DelegationContext::root(WorkerIdentity::new(name), self.max_depth),
            Arc::clone(&self.approvals),
            CancellationToken::new(),
        )
    }
}

/// Builder returned by [`WorkerEnvironment::builder`].
pub struct WorkerEnvironmentBuilder<'a> {
    config: &'a Config,
    backend: Option<Arc<dyn Backend>>,
    handler: Option<Arc<dyn ApprovalHandler>>,
    runner: Option<Arc<dyn WorkerRunner>>,
    toolsets: Vec<Arc<dyn Toolset>>,
}

impl WorkerEnvironmentBuilder<'_> {
    /// Store files in `backend` instead of the host filesystem.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Answer interactive approvals through `handler`.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Enable `call_worker`, running delegated workers through `runner`.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn WorkerRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Register an additional toolset.
    #[must_use]
    pub fn with_toolset(mut self, toolset: Arc<dyn Toolset>) -> Self {
        self.toolsets.push(toolset);
        self
    }

    /// Build the environment.
    ///
    /// # Errors
    ///
    /// Fails on an invalid sandbox configuration, an unknown approval mode, or
    /// duplicate tool names.
    pub fn build(self) -> ToolResult<WorkerEnvironment> {
        let backend = self.backend.unwrap_or_else(|| Arc::new(HostBackend::new()));
        let sandbox = Sandbox::new(to_sandbox_config(self.config), backend)?;

        let mut controller = ApprovalController::new(to_approval_mode(self.config)?);
        if let Some(handler) = self.handler {
            controller = controller.with_handler(handler);
        }
        let approvals = Arc::new(controller);

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(to_filesystem_toolset(self.config)))?;
        if let Some(runner) = self.runner {
            registry.register(Arc::new(WorkerToolset::new(runner)))?;
        }
        for toolset in self.toolsets {
            registry.register(toolset)?;
        }

        tracing::info!(
            root = %sandbox.config().root,
            mounts = sandbox.config().mounts.len(),
            mode = %approvals.mode(),
            tools = registry.len(),
            "Worker environment ready"
        );

        Ok(WorkerEnvironment {
            executor: ApprovedExecutor::new(Arc::new(registry), Arc::clone(&approvals)),
            sandbox,
            approvals,
            max_depth: self.config.delegation.max_depth,
        })
    }
}

impl std::fmt::Debug for WorkerEnvironmentBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerEnvironmentBuilder")
            .field("custom_backend", &self.backend.is_some())
            .field("handler", &self.handler.is_some())
            .field("runner", &self.runner.is_some())
            .field("extra_toolsets", &self.toolsets.len())
            .finish_non_exhaustive()
    }
}
