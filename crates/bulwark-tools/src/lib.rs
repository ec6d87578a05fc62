//! Approval-gated tool execution for Bulwark workers.
//!
//! Every tool call a worker makes goes through [`ApprovedExecutor`]:
//!
//! 1. The owning [`Toolset`] classifies the call as blocked, pre-approved, or
//!    needing approval ([`NeedsApproval`]).
//! 2. Calls that need approval are routed to the session's
//!    [`ApprovalController`](bulwark_approval::ApprovalController), which may
//!    answer from its session memory.
//! 3. Approved calls run against the worker's sandbox. Denials and errors come
//!    back as text the model can react to, never as a crash.
//!
//! [`WorkerToolset`] adds `call_worker`, which starts a delegated worker with
//! a restricted sandbox, the same approval controller, and a deeper
//! [`DelegationContext`].
//!
//! [`WorkerEnvironment`] wires all of it up from a loaded
//! [`bulwark_config::Config`].

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod delegation;
mod environment;
mod error;
mod executor;
mod filesystem;
mod registry;
mod result;
mod toolset;
mod worker;

pub use context::ToolContext;
pub use delegation::{DelegationContext, DelegationError, WorkerIdentity};
pub use environment::{
    WorkerEnvironment, WorkerEnvironmentBuilder, init_logging, to_approval_mode, to_filesystem_toolset,
    to_log_config, to_sandbox_config,
};
pub use error::{ToolError, ToolResult};
pub use executor::ApprovedExecutor;
pub use filesystem::FilesystemToolset;
pub use registry::ToolRegistry;
pub use result::{ToolCall, ToolOutcome};
pub use toolset::{ApprovalDescription, ApprovalRequirement, NeedsApproval, ToolDefinition, Toolset};
pub use worker::{CALL_WORKER, WorkerInvocation, WorkerOutput, WorkerRunner, WorkerToolset};
