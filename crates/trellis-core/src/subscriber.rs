//! Subscriber and observer contracts.
//!
//! These traits are the leaves of the dependency graph: observers implement
//! [`Subscribable`] or [`CollectionSubscribable`], bindings (through their
//! [`BindingObserverRecord`](crate::BindingObserverRecord)) implement
//! [`Subscriber`] and [`CollectionSubscriber`].
//!
//! [`SubscriberRecord`] is the list every observer keeps of its subscribers.
//! Subscribers are compared by identity (the address of the shared
//! allocation), never by value.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::flags::{AccessorType, LifecycleFlags};
use crate::index_map::IndexMap;

/// The dynamic value type carried by property observers.
pub type Value = serde_json::Value;

/// Receives property value changes.
pub trait Subscriber: Send + Sync {
    /// Called after the observed value changed.
    fn handle_change(&self, new_value: &Value, previous_value: &Value, flags: LifecycleFlags);
}

/// Receives collection mutations.
pub trait CollectionSubscriber: Send + Sync {
    /// Called after the observed collection changed.
    fn handle_collection_change(&self, index_map: &IndexMap, flags: LifecycleFlags);
}

/// Something that property subscribers can attach to.
pub trait Subscribable: Send + Sync {
    /// Attach a subscriber. Returns `false` if it was already attached.
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> bool;

    /// Detach a subscriber. Returns `false` if it was not attached.
    fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) -> bool;
}

/// Something that collection subscribers can attach to.
pub trait CollectionSubscribable: Send + Sync {
    /// Attach a subscriber. Returns `false` if it was already attached.
    fn subscribe(&self, subscriber: Arc<dyn CollectionSubscriber>) -> bool;

    /// Detach a subscriber. Returns `false` if it was not attached.
    fn unsubscribe(&self, subscriber: &Arc<dyn CollectionSubscriber>) -> bool;
}

/// Normalized get/set access to a value.
pub trait Accessor: Send + Sync {
    /// What kind of accessor this is.
    fn accessor_type(&self) -> AccessorType;

    /// Read the current value.
    fn get_value(&self) -> Value;

    /// Write a new value.
    fn set_value(&self, value: Value, flags: LifecycleFlags);
}

/// An accessor whose changes can be subscribed to.
pub trait Observer: Accessor + Subscribable {}

impl<T: Accessor + Subscribable> Observer for T {}

/// Whether two shared subscribers are the same allocation.
pub(crate) fn same_subscriber<S: ?Sized>(a: &Arc<S>, b: &Arc<S>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// The list of subscribers of a single observer.
///
/// Notification works on a snapshot of the list, so a subscriber may
/// subscribe or unsubscribe (itself or others) while being notified.
pub struct SubscriberRecord<S: ?Sized> {
    subscribers: Mutex<Vec<Arc<S>>>,
}

impl<S: ?Sized> SubscriberRecord<S> {
    /// Create an empty record.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Number of attached subscribers.
    pub fn count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Whether any subscriber is attached.
    pub fn any(&self) -> bool {
        !self.subscribers.lock().is_empty()
    }

    /// Whether `subscriber` is attached.
    pub fn has(&self, subscriber: &Arc<S>) -> bool {
        self.subscribers
            .lock()
            .iter()
            .any(|existing| same_subscriber(existing, subscriber))
    }

    /// Attach `subscriber`. Returns `false` if it was already attached.
    pub fn add(&self, subscriber: Arc<S>) -> bool {
        let mut subscribers = self.subscribers.lock();
        if subscribers
            .iter()
            .any(|existing| same_subscriber(existing, &subscriber))
        {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    /// Detach `subscriber`. Returns `false` if it was not attached.
    pub fn remove(&self, subscriber: &Arc<S>) -> bool {
        let mut subscribers = self.subscribers.lock();
        match subscribers
            .iter()
            .position(|existing| same_subscriber(existing, subscriber))
        {
            Some(index) => {
                subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Detach every subscriber.
    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }

    /// A copy of the current subscriber list, in subscription order.
    pub fn snapshot(&self) -> Vec<Arc<S>> {
        self.subscribers.lock().clone()
    }
}

impl SubscriberRecord<dyn Subscriber> {
    /// Notify every subscriber of a value change.
    pub fn notify(&self, new_value: &Value, previous_value: &Value, flags: LifecycleFlags) {
        for subscriber in self.snapshot() {
            subscriber.handle_change(new_value, previous_value, flags);
        }
    }
}

impl SubscriberRecord<dyn CollectionSubscriber> {
    /// Notify every subscriber of a collection change.
    pub fn notify_collection(&self, index_map: &IndexMap, flags: LifecycleFlags) {
        for subscriber in self.snapshot() {
            subscriber.handle_collection_change(index_map, flags);
        }
    }
}

impl<S: ?Sized> Default for SubscriberRecord<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> fmt::Debug for SubscriberRecord<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRecord")
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Subscriber for Counting {
        fn handle_change(&self, _new: &Value, _previous: &Value, _flags: LifecycleFlags) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CollectionSubscriber for Counting {
        fn handle_collection_change(&self, _index_map: &IndexMap, _flags: LifecycleFlags) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let record: SubscriberRecord<dyn Subscriber> = SubscriberRecord::new();
        let subscriber: Arc<dyn Subscriber> = Arc::new(Counting::default());

        assert!(record.add(subscriber.clone()));
        assert!(!record.add(subscriber.clone()));
        assert_eq!(record.count(), 1);
        assert!(record.has(&subscriber));
    }

    #[test]
    fn test_remove() {
        let record: SubscriberRecord<dyn Subscriber> = SubscriberRecord::new();
        let first: Arc<dyn Subscriber> = Arc::new(Counting::default());
        let second: Arc<dyn Subscriber> = Arc::new(Counting::default());
        record.add(first.clone());
        record.add(second.clone());

        assert!(record.remove(&first));
        assert!(!record.remove(&first));
        assert!(record.any());
        assert!(record.has(&second));
        assert!(!record.has(&first));
    }

    #[test]
    fn test_notify_reaches_every_subscriber() {
        let record: SubscriberRecord<dyn Subscriber> = SubscriberRecord::new();
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        record.add(a.clone());
        record.add(b.clone());

        record.notify(&Value::from(1), &Value::Null, LifecycleFlags::NONE);

        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_notify_collection() {
        let record: SubscriberRecord<dyn CollectionSubscriber> = SubscriberRecord::new();
        let subscriber = Arc::new(Counting::default());
        record.add(subscriber.clone());

        record.notify_collection(&IndexMap::new(2), LifecycleFlags::NONE);
        record.clear();
        record.notify_collection(&IndexMap::new(2), LifecycleFlags::NONE);

        assert_eq!(subscriber.calls.load(Ordering::SeqCst), 1);
    }
}
