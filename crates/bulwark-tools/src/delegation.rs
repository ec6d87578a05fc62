//! Delegation chain tracking for worker-to-worker calls.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A worker in a delegation chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerIdentity {
    /// Worker definition name.
    pub name: String,
    /// Unique id of this running instance.
    pub id: String,
}

impl WorkerIdentity {
    /// A fresh instance of the named worker.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Delegation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DelegationError {
    /// The chain is already as deep as allowed.
    #[error("maximum delegation depth ({max_depth}) exceeded: {chain} -> {requested}")]
    DepthExceeded {
        /// Configured limit.
        max_depth: usize,
        /// Chain at the point of the refused call.
        chain: String,
        /// Worker that would have been started.
        requested: String,
    },
}

/// Where a worker sits in the chain of delegations that started it.
///
/// Immutable: [`DelegationContext::child`] returns a new context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationContext {
    path: Vec<WorkerIdentity>,
    depth: usize,
    max_depth: usize,
}

impl DelegationContext {
    /// The context of a top-level worker.
    #[must_use]
    pub fn root(identity: WorkerIdentity, max_depth: usize) -> Self {
        Self {
            path: vec![identity],
            depth: 0,
            max_depth,
        }
    }

    /// The context for a worker called from this one.
    ///
    /// # Errors
    ///
    /// Returns [`DelegationError::DepthExceeded`] when `depth >= max_depth`.
    pub fn child(&self, identity: WorkerIdentity) -> Result<Self, DelegationError> {
        let exceeded = || DelegationError::DepthExceeded {
            max_depth: self.max_depth,
            chain: self.chain(),
            requested: identity.name.clone(),
        };
        if self.depth >= self.max_depth {
            return Err(exceeded());
        }
        let depth = self.depth.checked_add(1).ok_or_else(exceeded)?;
        let mut path = self.path.clone();
        path.push(identity);
        Ok(Self {
            path,
            depth,
            max_depth: self.max_depth,
        })
    }

    /// The worker this context belongs to.
    #[must_use]
    pub fn current(&self) -> Option<&WorkerIdentity> {
        self.path.last()
    }

    /// Every worker from the root to the current one.
    #[must_use]
    pub fn path(&self) -> &[WorkerIdentity] {
        &self.path
    }

    /// Number of hops from the root worker.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Configured limit.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether another hop is still allowed.
    #[must_use]
    pub fn can_delegate(&self) -> bool {
        self.depth < self.max_depth
    }

    /// `a -> b -> c`, for logs and error messages.
    #[must_use]
    pub fn chain(&self) -> String {
        self.path
            .iter()
            .map(|w| w.name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
