//! Bulwark Virtual File System (VFS).
//!
//! Provides the sandboxed view of storage that worker tools operate on:
//!
//! - [`VirtualPath`] normalizes every incoming path and rejects traversal.
//! - [`MountTable`] maps virtual prefixes onto concrete backing locations
//!   (longest target wins).
//! - [`PermissionGate`] answers whether a resolved path lies inside a writable
//!   region.
//! - [`Sandbox`] composes the three over a [`Backend`] (host filesystem or an
//!   in-memory, origin-isolated filesystem) and can derive strictly narrower
//!   child sandboxes for delegated workers via [`Sandbox::restrict`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bulwark_vfs::{MemoryBackend, MountConfig, Sandbox, SandboxConfig, SandboxRestriction};
//!
//! # tokio_test_block_on(async {
//! let config = SandboxConfig::new("/proj")
//!     .with_mount(MountConfig::new("/data", "/d"));
//! let sandbox = Sandbox::new(config, Arc::new(MemoryBackend::new())).unwrap();
//!
//! sandbox.write("/d/report.md", "hello").await.unwrap();
//! assert_eq!(sandbox.resolve("/d/report.md").unwrap(), "/data/report.md");
//!
//! let child = sandbox.restrict(&SandboxRestriction::to("/d")).unwrap();
//! assert_eq!(child.config().root, "/data");
//! assert_eq!(child.read("/report.md").await.unwrap(), "hello");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Storage backends (host filesystem, in-memory filesystem).
pub mod backend;
/// Sandbox construction and restriction configuration.
pub mod config;
/// Sandbox error types and LLM-facing error codes.
pub mod error;
/// Write permission checks.
pub mod gate;
/// Mount table resolution.
pub mod mount;
/// Virtual path normalization.
pub mod path;
/// The sandbox facade.
pub mod sandbox;

pub use backend::{Backend, BackendError, BackendResult, FileStat, HostBackend, Location, MemoryBackend};
pub use config::{MountConfig, ResolvedSandboxConfig, SandboxConfig, SandboxRestriction};
pub use error::{ErrorCode, SandboxError, SandboxResult};
pub use gate::{Operation, PermissionGate};
pub use mount::{Mount, MountTable};
pub use path::VirtualPath;
pub use sandbox::Sandbox;
