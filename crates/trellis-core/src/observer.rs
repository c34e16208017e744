//! Observable objects and their property observers.
//!
//! An [`ObservableObject`] is a bag of named [`Value`]s. Every property is
//! backed by a [`PropertyObserver`] that owns the value and the list of
//! subscribers interested in it. Observers are created on first access, so
//! observing a property that was never written yields `null` until a value
//! arrives.
//!
//! The [`ObserverLocator`] is the single place bindings go to obtain an
//! observer, for properties as well as for collections.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::batch;
use crate::collection::{CollectionObserver, ObservedCollection};
use crate::error::{ObservationError, ObservationResult};
use crate::flags::{AccessorType, LifecycleFlags};
use crate::logging::targets;
use crate::subscriber::{Accessor, Subscribable, Subscriber, SubscriberRecord, Value};

/// Observer for a single property of an [`ObservableObject`].
pub struct PropertyObserver {
    key: String,
    value: RwLock<Value>,
    read_only: bool,
    subscribers: SubscriberRecord<dyn Subscriber>,
    this: Weak<PropertyObserver>,
}

impl PropertyObserver {
    fn new(key: &str, value: Value, read_only: bool) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            key: key.to_string(),
            value: RwLock::new(value),
            read_only,
            subscribers: SubscriberRecord::new(),
            this: this.clone(),
        })
    }

    /// The observed property name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether writes are rejected.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The subscriber list of this observer.
    pub fn subscribers(&self) -> &SubscriberRecord<dyn Subscriber> {
        &self.subscribers
    }

    /// Write a value, reporting read-only violations.
    ///
    /// Writing a value equal to the current one is a no-op.
    pub fn try_set_value(&self, value: Value, flags: LifecycleFlags) -> ObservationResult<()> {
        if self.read_only {
            return Err(ObservationError::ReadOnlyProperty(self.key.clone()));
        }
        self.write(value, flags);
        Ok(())
    }

    fn write(&self, value: Value, flags: LifecycleFlags) {
        let previous = {
            let mut current = self.value.write();
            if *current == value {
                return;
            }
            std::mem::replace(&mut *current, value.clone())
        };
        tracing::trace!(target: targets::OBSERVER, key = %self.key, "property changed");

        if !self.subscribers.any() {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            if batch::defer(&this, &previous, flags) {
                return;
            }
        }
        self.notify(&value, &previous, flags);
    }

    pub(crate) fn notify(&self, new_value: &Value, previous_value: &Value, flags: LifecycleFlags) {
        self.subscribers.notify(new_value, previous_value, flags);
    }
}

impl Accessor for PropertyObserver {
    fn accessor_type(&self) -> AccessorType {
        AccessorType::OBSERVER
    }

    fn get_value(&self) -> Value {
        self.value.read().clone()
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) {
        if let Err(err) = self.try_set_value(value, flags) {
            tracing::warn!(target: targets::OBSERVER, error = %err, "ignored write");
        }
    }
}

impl Subscribable for PropertyObserver {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }
}

impl fmt::Debug for PropertyObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyObserver")
            .field("key", &self.key)
            .field("value", &*self.value.read())
            .field("subscribers", &self.subscribers.count())
            .finish()
    }
}

/// An object whose properties can be observed.
#[derive(Default)]
pub struct ObservableObject {
    properties: RwLock<BTreeMap<String, Arc<PropertyObserver>>>,
}

impl ObservableObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object from a JSON object. Non-object values yield an empty object.
    pub fn from_json(value: Value) -> Self {
        let object = Self::new();
        if let Value::Object(map) = value {
            let mut properties = object.properties.write();
            for (key, value) in map {
                let observer = PropertyObserver::new(&key, value, false);
                properties.insert(key, observer);
            }
        }
        object
    }

    /// Read a property, `null` if it does not exist.
    pub fn get(&self, key: &str) -> Value {
        self.properties
            .read()
            .get(key)
            .map(|observer| observer.get_value())
            .unwrap_or(Value::Null)
    }

    /// Write a property, creating it if needed.
    pub fn set(&self, key: &str, value: Value) -> ObservationResult<()> {
        self.set_with_flags(key, value, LifecycleFlags::NONE)
    }

    /// Write a property with explicit lifecycle flags.
    pub fn set_with_flags(
        &self,
        key: &str,
        value: Value,
        flags: LifecycleFlags,
    ) -> ObservationResult<()> {
        self.observer(key).try_set_value(value, flags)
    }

    /// Define a property that cannot be written afterwards.
    ///
    /// Redefining an existing property replaces its observer; existing
    /// subscribers stay attached to the old one.
    pub fn define_readonly(&self, key: &str, value: Value) {
        let observer = PropertyObserver::new(key, value, true);
        self.properties.write().insert(key.to_string(), observer);
    }

    /// Whether the property exists.
    pub fn has(&self, key: &str) -> bool {
        self.properties.read().contains_key(key)
    }

    /// Property names in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }

    /// The observer of `key`, created with a `null` value if missing.
    pub fn observer(&self, key: &str) -> Arc<PropertyObserver> {
        if let Some(observer) = self.properties.read().get(key) {
            return observer.clone();
        }
        self.properties
            .write()
            .entry(key.to_string())
            .or_insert_with(|| PropertyObserver::new(key, Value::Null, false))
            .clone()
    }

    /// Snapshot of all properties as a JSON object.
    pub fn to_json(&self) -> Value {
        let properties = self.properties.read();
        Value::Object(
            properties
                .iter()
                .map(|(key, observer)| (key.clone(), observer.get_value()))
                .collect(),
        )
    }
}

impl fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableObject")
            .field("properties", &self.to_json())
            .finish()
    }
}

/// Resolves observers and accessors for objects and collections.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObserverLocator;

impl ObserverLocator {
    /// Create a locator.
    pub fn new() -> Self {
        Self
    }

    /// The observer of `key` on `object`.
    pub fn get_observer(&self, object: &ObservableObject, key: &str) -> Arc<PropertyObserver> {
        object.observer(key)
    }

    /// Get/set access to `key` on `object`.
    pub fn get_accessor(&self, object: &ObservableObject, key: &str) -> Arc<dyn Accessor> {
        object.observer(key)
    }

    /// The observer of a collection.
    pub fn get_collection_observer(
        &self,
        collection: &dyn ObservedCollection,
    ) -> Arc<CollectionObserver> {
        collection.collection_observer()
    }
}
