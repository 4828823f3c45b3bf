//! # Write Scope
//!
//! A bounded interval in which many writes count as one unit for cache
//! invalidation.
//!
//! ```text
//! Idle ──enter──► Active(1) ──enter──► Active(n) ──exit──► … ──exit──► Idle
//!                                                         (outermost exit
//!                                                          flushes deferred
//!                                                          invalidations)
//! ```
//!
//! While a scope is active the property cache reads straight from storage and
//! buffers its invalidations here with [`WriteScope::defer`]. Deferred actions
//! are keyed by a tag, so a bulk import that touches ten thousand properties
//! still clears the segment cache exactly once.
//!
//! A scope is a value owned by a [`WorkContext`](crate::WorkContext), never a
//! process-wide flag: a request outside the scope keeps reading cached data
//! until the flush.
//!
//! # Examples
//!
//! ```
//! use localito_core::WriteScope;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let scope = WriteScope::new(true);
//! let flushed = Arc::new(AtomicUsize::new(0));
//!
//! {
//!     let _outer = scope.enter();
//!     {
//!         let _inner = scope.enter();
//!         let f = flushed.clone();
//!         scope.defer("segments", move || {
//!             f.fetch_add(1, Ordering::SeqCst);
//!         });
//!     }
//!     // Inner exit does not flush.
//!     assert_eq!(flushed.load(Ordering::SeqCst), 0);
//! }
//!
//! assert_eq!(flushed.load(Ordering::SeqCst), 1);
//! assert!(!scope.is_active());
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type DeferredAction = Box<dyn FnOnce() + Send>;

struct ScopeState {
    depth: AtomicUsize,
    auto_commit: bool,
    committed: AtomicBool,
    pending: Mutex<Vec<(String, DeferredAction)>>,
}

/// Cloneable handle to one write scope; clones share depth and pending actions.
#[derive(Clone)]
pub struct WriteScope {
    state: Arc<ScopeState>,
}

impl WriteScope {
    /// Creates an idle scope.
    ///
    /// Without `auto_commit`, every bulk write is expected to end with
    /// [`commit`](Self::commit); an outermost exit without one is reported as
    /// an abandoned bulk write. Deferred actions run at the outermost exit
    /// either way, since the writes they follow already reached storage.
    pub fn new(auto_commit: bool) -> Self {
        WriteScope {
            state: Arc::new(ScopeState {
                depth: AtomicUsize::new(0),
                auto_commit,
                committed: AtomicBool::new(false),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Enters the scope (or a nested level of it). Dropping the guard exits.
    #[must_use = "the scope exits as soon as the guard is dropped"]
    pub fn enter(&self) -> WriteScopeGuard {
        let depth = self.state.depth.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(depth, "Entered write scope");
        WriteScopeGuard {
            scope: self.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.depth() > 0
    }

    pub fn depth(&self) -> usize {
        self.state.depth.load(Ordering::Acquire)
    }

    /// Whether invalidations are waiting for the outermost exit.
    pub fn has_pending_changes(&self) -> bool {
        !self.state.pending.lock().is_empty()
    }

    pub fn auto_commit(&self) -> bool {
        self.state.auto_commit
    }

    /// Buffers `action` until the outermost exit, or runs it now when idle.
    ///
    /// Actions sharing a `tag` collapse into the first one registered.
    ///
    /// # Returns
    ///
    /// `true` if the action was deferred
    pub fn defer<F>(&self, tag: &str, action: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_active() {
            action();
            return false;
        }

        let mut pending = self.state.pending.lock();
        if !pending.iter().any(|(existing, _)| existing == tag) {
            pending.push((tag.to_string(), Box::new(action)));
        }
        true
    }

    /// Marks the current bulk write as complete.
    pub fn commit(&self) {
        if self.is_active() {
            self.state.committed.store(true, Ordering::Release);
        }
    }

    fn exit(&self) {
        let previous = self.state.depth.fetch_sub(1, Ordering::AcqRel);
        if previous != 1 {
            debug!(depth = previous.saturating_sub(1), "Left nested write scope");
            return;
        }

        let actions = std::mem::take(&mut *self.state.pending.lock());
        let committed = self.state.committed.swap(false, Ordering::AcqRel);

        if actions.is_empty() {
            return;
        }

        if !self.state.auto_commit && !committed {
            warn!(
                actions = actions.len(),
                "Write scope exited without commit, bulk write may be incomplete"
            );
        }

        debug!(actions = actions.len(), "Flushing deferred invalidations");
        for (_, action) in actions {
            action();
        }
    }
}

impl Default for WriteScope {
    fn default() -> Self {
        WriteScope::new(true)
    }
}

impl fmt::Debug for WriteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteScope")
            .field("depth", &self.depth())
            .field("auto_commit", &self.state.auto_commit)
            .field("pending", &self.state.pending.lock().len())
            .finish()
    }
}

/// RAII guard returned by [`WriteScope::enter`].
pub struct WriteScopeGuard {
    scope: WriteScope,
}

impl WriteScopeGuard {
    pub fn scope(&self) -> &WriteScope {
        &self.scope
    }
}

impl Drop for WriteScopeGuard {
    fn drop(&mut self) {
        self.scope.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let make = move || -> Box<dyn FnOnce() + Send> {
            let c = c.clone();
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, make)
    }

    #[test]
    fn test_depth_tracking() {
        let scope = WriteScope::new(true);
        assert!(!scope.is_active());

        let outer = scope.enter();
        let inner = scope.enter();
        assert_eq!(scope.depth(), 2);
        drop(inner);
        assert_eq!(scope.depth(), 1);
        drop(outer);
        assert_eq!(scope.depth(), 0);
    }

    #[test]
    fn test_defer_when_idle_runs_immediately() {
        let scope = WriteScope::new(true);
        let (count, make) = counter();
        assert!(!scope.defer("t", make()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_only_outermost_exit_flushes_once() {
        let scope = WriteScope::new(true);
        let (count, make) = counter();

        let outer = scope.enter();
        {
            let _inner = scope.enter();
            for _ in 0..100 {
                scope.defer("segments", make());
            }
            assert!(scope.has_pending_changes());
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        drop(outer);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scope.has_pending_changes());
    }

    #[test]
    fn test_distinct_tags_each_run() {
        let scope = WriteScope::new(true);
        let (count, make) = counter();
        {
            let _guard = scope.enter();
            scope.defer("a", make());
            scope.defer("b", make());
            scope.defer("a", make());
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_without_auto_commit_still_flushes() {
        let scope = WriteScope::new(false);
        let (count, make) = counter();

        // Exit without commit: storage already changed, so the flush runs
        {
            let _guard = scope.enter();
            scope.defer("segments", make());
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scope.has_pending_changes());

        {
            let _guard = scope.enter();
            scope.defer("segments", make());
            scope.commit();
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_commit_resets_at_outermost_exit() {
        let scope = WriteScope::new(false);
        {
            let _guard = scope.enter();
            scope.commit();
            assert!(scope.state.committed.load(Ordering::Acquire));
        }
        assert!(!scope.state.committed.load(Ordering::Acquire));

        // Outside a scope there is nothing to commit
        scope.commit();
        assert!(!scope.state.committed.load(Ordering::Acquire));
    }

    #[test]
    fn test_clones_share_state() {
        let scope = WriteScope::new(true);
        let other = scope.clone();
        let _guard = scope.enter();
        assert!(other.is_active());
    }
}
