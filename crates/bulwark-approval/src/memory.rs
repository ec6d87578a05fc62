//! Session-scoped approval cache.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::fingerprint::Fingerprint;
use crate::request::ApprovalDecision;

/// Decisions the user asked to reuse for the rest of the session.
///
/// Keyed by [`Fingerprint`]; only `remember = session` approvals are kept.
/// Entries never expire on their own.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use bulwark_approval::{ApprovalDecision, ApprovalMemory};
///
/// let memory = ApprovalMemory::new();
/// let args = BTreeMap::new();
/// assert!(!memory.store("make_dir", &args, ApprovalDecision::approve_once()));
/// assert!(memory.store("make_dir", &args, ApprovalDecision::approve_for_session()));
/// assert_eq!(memory.len(), 1);
/// ```
#[derive(Default)]
pub struct ApprovalMemory {
    entries: RwLock<HashMap<Fingerprint, ApprovalDecision>>,
}

impl ApprovalMemory {
    /// Create an empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Fingerprint, ApprovalDecision>> {
        self.entries.read().unwrap_or_else(|e| {
            tracing::warn!("ApprovalMemory read lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Fingerprint, ApprovalDecision>> {
        self.entries.write().unwrap_or_else(|e| {
            tracing::warn!("ApprovalMemory lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// The cached decision for this exact call, if any.
    #[must_use]
    pub fn lookup(&self, tool_name: &str, args: &BTreeMap<String, Value>) -> Option<ApprovalDecision> {
        let fingerprint = Fingerprint::of(tool_name, args);
        self.read().get(&fingerprint).cloned()
    }

    /// Remember `decision` if it is session-scoped. Returns whether it was stored.
    pub fn store(&self, tool_name: &str, args: &BTreeMap<String, Value>, decision: ApprovalDecision) -> bool {
        if !decision.is_session_scoped() {
            return false;
        }
        let fingerprint = Fingerprint::of(tool_name, args);
        tracing::debug!(%fingerprint, "Remembering approval for session");
        self.write().insert(fingerprint, decision);
        true
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of cached decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl fmt::Debug for ApprovalMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalMemory")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> BTreeMap<String, Value> {
        match v {
            Value::Object(m) => m.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }

    #[test]
    fn test_only_session_decisions_stored() {
        let memory = ApprovalMemory::new();
        let a = args(json!({"path": "/x"}));
        assert!(!memory.store("write_file", &a, ApprovalDecision::approve_once()));
        assert!(!memory.store("write_file", &a, ApprovalDecision::deny("no")));
        assert!(memory.is_empty());
        assert!(memory.store("write_file", &a, ApprovalDecision::approve_for_session()));
        assert_eq!(
            memory.lookup("write_file", &a),
            Some(ApprovalDecision::approve_for_session())
        );
    }

    #[test]
    fn test_lookup_ignores_key_order() {
        let memory = ApprovalMemory::new();
        memory.store(
            "write_file",
            &args(json!({"path": "/x", "content": "hi"})),
            ApprovalDecision::approve_for_session(),
        );
        assert!(memory
            .lookup("write_file", &args(json!({"content": "hi", "path": "/x"})))
            .is_some());
        assert!(memory
            .lookup("write_file", &args(json!({"content": "bye", "path": "/x"})))
            .is_none());
    }

    #[test]
    fn test_clear() {
        let memory = ApprovalMemory::new();
        memory.store("t", &BTreeMap::new(), ApprovalDecision::approve_for_session());
        memory.clear();
        assert_eq!(memory.len(), 0);
        assert!(memory.lookup("t", &BTreeMap::new()).is_none());
    }
}
