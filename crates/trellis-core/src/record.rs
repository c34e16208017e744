//! Per-binding dependency tracking.
//!
//! A [`BindingObserverRecord`] remembers every observer a binding read during
//! its last evaluation. Before evaluating, the binding bumps the record's
//! version; every observer touched during evaluation is stamped with the new
//! version. [`clear`](BindingObserverRecord::clear) then unsubscribes from the
//! observers that were not touched, so dependencies follow the evaluation
//! instead of accumulating.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::flags::LifecycleFlags;
use crate::index_map::IndexMap;
use crate::logging::targets;
use crate::subscriber::{
    CollectionSubscribable, CollectionSubscriber, Subscribable, Subscriber, Value,
};

/// Something that receives both value and collection changes.
///
/// Bindings implement this; their record forwards notifications to them.
pub trait BindingTarget: Subscriber + CollectionSubscriber {}

impl<T: Subscriber + CollectionSubscriber> BindingTarget for T {}

/// An observer a binding depends on.
#[derive(Clone)]
pub enum Dependency {
    /// A property-like observer.
    Value(Arc<dyn Subscribable>),
    /// A collection observer.
    Collection(Arc<dyn CollectionSubscribable>),
}

impl Dependency {
    fn key(&self) -> usize {
        match self {
            Self::Value(observer) => Arc::as_ptr(observer) as *const () as usize,
            Self::Collection(observer) => Arc::as_ptr(observer) as *const () as usize,
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => write!(f, "Dependency::Value({:#x})", self.key()),
            Self::Collection(_) => write!(f, "Dependency::Collection({:#x})", self.key()),
        }
    }
}

struct Forwarder {
    target: Weak<dyn BindingTarget>,
}

impl Subscriber for Forwarder {
    fn handle_change(&self, new_value: &Value, previous_value: &Value, flags: LifecycleFlags) {
        if let Some(target) = self.target.upgrade() {
            target.handle_change(new_value, previous_value, flags);
        }
    }
}

impl CollectionSubscriber for Forwarder {
    fn handle_collection_change(&self, index_map: &IndexMap, flags: LifecycleFlags) {
        if let Some(target) = self.target.upgrade() {
            target.handle_collection_change(index_map, flags);
        }
    }
}

struct Entry {
    dependency: Dependency,
    version: u64,
}

/// The set of observers a single binding is subscribed to.
pub struct BindingObserverRecord {
    forwarder: Arc<Forwarder>,
    entries: Mutex<HashMap<usize, Entry>>,
    version: AtomicU64,
    count: AtomicUsize,
}

impl BindingObserverRecord {
    /// Create a record that forwards notifications to `target`.
    pub fn new(target: Weak<dyn BindingTarget>) -> Self {
        Self {
            forwarder: Arc::new(Forwarder { target }),
            entries: Mutex::new(HashMap::new()),
            version: AtomicU64::new(0),
            count: AtomicUsize::new(0),
        }
    }

    /// The current version.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Start a new evaluation pass and return its version.
    pub fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of active subscriptions.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether `dependency` is currently recorded.
    pub fn has(&self, dependency: &Dependency) -> bool {
        self.entries.lock().contains_key(&dependency.key())
    }

    /// Record a dependency for the current version.
    ///
    /// The record subscribes the first time it sees an observer; later calls
    /// only refresh the version stamp.
    pub fn add(&self, dependency: Dependency) {
        let version = self.version();
        let key = dependency.key();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            entry.version = version;
            return;
        }
        match &dependency {
            Dependency::Value(observer) => {
                observer.subscribe(self.forwarder.clone());
            }
            Dependency::Collection(observer) => {
                observer.subscribe(self.forwarder.clone());
            }
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        entries.insert(
            key,
            Entry {
                dependency,
                version,
            },
        );
    }

    /// Record a property-like observer.
    pub fn add_value(&self, observer: Arc<dyn Subscribable>) {
        self.add(Dependency::Value(observer));
    }

    /// Record a collection observer.
    pub fn add_collection(&self, observer: Arc<dyn CollectionSubscribable>) {
        self.add(Dependency::Collection(observer));
    }

    /// Unsubscribe from every observer not stamped with the current version.
    #[tracing::instrument(skip(self), target = "trellis_core::record", level = "trace")]
    pub fn clear(&self) {
        if self.count() == 0 {
            return;
        }
        let version = self.version();
        let stale: Vec<Dependency> = {
            let mut entries = self.entries.lock();
            let keys: Vec<usize> = entries
                .iter()
                .filter(|(_, entry)| entry.version != version)
                .map(|(key, _)| *key)
                .collect();
            let stale = keys
                .iter()
                .filter_map(|key| entries.remove(key))
                .map(|entry| entry.dependency)
                .collect();
            self.count.store(entries.len(), Ordering::SeqCst);
            stale
        };
        if !stale.is_empty() {
            tracing::trace!(
                target: targets::RECORD,
                dropped = stale.len(),
                "pruned stale observers"
            );
        }
        for dependency in stale {
            self.unsubscribe(&dependency);
        }
    }

    /// Unsubscribe from every observer.
    pub fn clear_all(&self) {
        let all: Vec<Dependency> = {
            let mut entries = self.entries.lock();
            self.count.store(0, Ordering::SeqCst);
            entries.drain().map(|(_, entry)| entry.dependency).collect()
        };
        for dependency in all {
            self.unsubscribe(&dependency);
        }
    }

    fn unsubscribe(&self, dependency: &Dependency) {
        match dependency {
            Dependency::Value(observer) => {
                let subscriber: Arc<dyn Subscriber> = self.forwarder.clone();
                observer.unsubscribe(&subscriber);
            }
            Dependency::Collection(observer) => {
                let subscriber: Arc<dyn CollectionSubscriber> = self.forwarder.clone();
                observer.unsubscribe(&subscriber);
            }
        }
    }
}

impl Drop for BindingObserverRecord {
    fn drop(&mut self) {
        self.clear_all();
    }
}

impl fmt::Debug for BindingObserverRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingObserverRecord")
            .field("version", &self.version())
            .field("count", &self.count())
            .finish()
    }
}
