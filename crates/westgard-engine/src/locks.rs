//! Per-context critical sections.
//!
//! INVARIANT: at most one evaluation per context is in flight. Each context
//! maps to its own mutex; the map holds weak references so idle contexts do
//! not pin memory, and dead entries are pruned once the map grows past a
//! threshold.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use westgard_core::ContextKey;

/// Default map size above which dead entries are pruned.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 128;

/// Mutex registry keyed by context.
pub struct ContextLocks {
    locks: Mutex<HashMap<ContextKey, Weak<Mutex<()>>>>,
    prune_threshold: usize,
}

impl ContextLocks {
    /// Registry that prunes dead entries past `prune_threshold` contexts.
    pub fn new(prune_threshold: usize) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            prune_threshold,
        }
    }

    /// The mutex for `context`, shared with every other current holder.
    pub fn acquire(&self, context: &ContextKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();

        if locks.len() > self.prune_threshold {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(context).and_then(Weak::upgrade) {
            return existing;
        }

        let lock = Arc::new(Mutex::new(()));
        let _ = locks.insert(context.clone(), Arc::downgrade(&lock));
        lock
    }

    /// Run `f` while holding the context's critical section.
    pub fn with_context<T>(&self, context: &ContextKey, f: impl FnOnce() -> T) -> T {
        let lock = self.acquire(context);
        let _guard = lock.lock();
        f()
    }

    /// Contexts currently tracked, live or not yet pruned.
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Default for ContextLocks {
    fn default() -> Self {
        Self::new(DEFAULT_PRUNE_THRESHOLD)
    }
}

impl std::fmt::Debug for ContextLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLocks")
            .field("tracked", &self.tracked())
            .field("prune_threshold", &self.prune_threshold)
            .finish()
    }
}
