//! Per-artifact exclusive locks.
//!
//! Acquisition never waits: a held lock means another transition on the
//! same artifact is in progress, and the caller gets `None` immediately.
//! The lock is released when the returned guard is dropped.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use pubflow_core::ArtifactId;

/// The set of artifacts with a transition in progress.
#[derive(Debug, Clone, Default)]
pub struct ArtifactLocks {
    held: Arc<Mutex<HashSet<ArtifactId>>>,
}

impl ArtifactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `id`, or return `None` if it is held.
    pub fn try_acquire(&self, id: ArtifactId) -> Option<ArtifactGuard> {
        if self.held.lock().insert(id) {
            Some(ArtifactGuard {
                held: Arc::clone(&self.held),
                id,
            })
        } else {
            None
        }
    }

    pub fn is_held(&self, id: &ArtifactId) -> bool {
        self.held.lock().contains(id)
    }
}

/// Releases the artifact lock on drop.
#[derive(Debug)]
pub struct ArtifactGuard {
    held: Arc<Mutex<HashSet<ArtifactId>>>,
    id: ArtifactId,
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.id);
    }
}
