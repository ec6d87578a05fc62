//! Bulwark Approval - gating side-effecting tool calls behind user decisions.
//!
//! - [`ApprovalController`] applies the session's [`ApprovalMode`], consults
//!   [`ApprovalMemory`] and otherwise asks the registered [`ApprovalHandler`].
//! - [`ApprovalMemory`] caches `remember = session` decisions under a
//!   canonical [`Fingerprint`] of the tool name and arguments.
//! - [`ApprovalEvent`] is the wire shape exchanged with a UI.
//!
//! # Example
//!
//! ```
//! use bulwark_approval::{ApprovalController, ApprovalDecision, ApprovalMode, ApprovalRequest};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let controller = ApprovalController::new(ApprovalMode::AutoDeny);
//! let request = ApprovalRequest::new("write_file", json!({"path": "/x"}), "Write /x");
//!
//! let decision = controller.request_approval(request).await.unwrap();
//! assert_eq!(decision, ApprovalDecision::deny("auto-deny mode"));
//! # });
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod controller;
/// Error types and results for the approval module.
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod memory;
pub mod request;

pub use controller::{ApprovalController, ApprovalHandler, ApprovalMode};
pub use error::{ApprovalError, ApprovalResult};
pub use event::{ApprovalAnswer, ApprovalEvent, ChannelApprovalHandler};
pub use fingerprint::{Fingerprint, canonical_json};
pub use memory::ApprovalMemory;
pub use request::{ApprovalDecision, ApprovalRequest, RememberScope, RequestId, RiskLevel};
