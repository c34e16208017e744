//! Batched property notifications.
//!
//! Inside a [`BatchScope`], property values update immediately but their
//! change notifications are queued. When the outermost scope on the thread
//! exits, each changed observer is notified once, with the value it had
//! before the batch started and the value it has now. Observers whose value
//! ended up where it started are not notified at all.
//!
//! ```
//! use trellis_core::{BatchScope, ObservableObject};
//! use serde_json::json;
//!
//! let object = ObservableObject::new();
//! {
//!     let _batch = BatchScope::new();
//!     object.set("x", json!(1)).unwrap();
//!     object.set("x", json!(2)).unwrap();
//!     // Values are visible right away, notifications are not sent yet.
//!     assert_eq!(object.get("x"), json!(2));
//! }
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::flags::LifecycleFlags;
use crate::logging::targets;
use crate::observer::PropertyObserver;
use crate::subscriber::{Accessor, Value};

struct PendingChange {
    observer: Arc<PropertyObserver>,
    previous: Value,
    flags: LifecycleFlags,
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: Vec<PendingChange>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// RAII guard that defers property notifications on the current thread.
///
/// Scopes nest; only the outermost one flushes.
#[must_use = "notifications are flushed when the scope is dropped"]
pub struct BatchScope {
    // Batches are per thread.
    _not_send: PhantomData<*const ()>,
}

impl BatchScope {
    /// Open a batch scope.
    pub fn new() -> Self {
        BATCH.with(|state| state.borrow_mut().depth += 1);
        Self {
            _not_send: PhantomData,
        }
    }

    /// Whether a batch is open on the current thread.
    pub fn is_active() -> bool {
        BATCH.with(|state| state.borrow().depth > 0)
    }

    /// Current nesting depth on this thread.
    pub fn depth() -> usize {
        BATCH.with(|state| state.borrow().depth)
    }

    /// Number of queued notifications (before deduplication).
    pub fn pending_count() -> usize {
        BATCH.with(|state| state.borrow().pending.len())
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let drained = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth = state.depth.saturating_sub(1);
            if state.depth == 0 {
                Some(std::mem::take(&mut state.pending))
            } else {
                None
            }
        });
        if let Some(pending) = drained {
            flush(pending);
        }
    }
}

/// Run `f` inside a batch scope.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _scope = BatchScope::new();
    f()
}

/// Queue a notification if a batch is open. Returns `false` otherwise.
pub(crate) fn defer(
    observer: &Arc<PropertyObserver>,
    previous: &Value,
    flags: LifecycleFlags,
) -> bool {
    BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.depth == 0 {
            return false;
        }
        state.pending.push(PendingChange {
            observer: observer.clone(),
            previous: previous.clone(),
            flags,
        });
        true
    })
}

fn flush(pending: Vec<PendingChange>) {
    if pending.is_empty() {
        return;
    }
    let mut unique: Vec<PendingChange> = Vec::with_capacity(pending.len());
    for change in pending {
        if !unique
            .iter()
            .any(|existing| Arc::ptr_eq(&existing.observer, &change.observer))
        {
            unique.push(change);
        }
    }
    tracing::trace!(target: targets::BATCH, observers = unique.len(), "flushing batch");

    for change in unique {
        let current = change.observer.get_value();
        if current != change.previous {
            change.observer.notify(&current, &change.previous, change.flags);
        }
    }
}
