//! Connectable bindings.
//!
//! [`Connectable`] gives a binding the ability to `observe` what it reads
//! while it evaluates. The observations go to the binding's
//! [`BindingObserverRecord`], which subscribes on the binding's behalf.
//!
//! Two concrete connectables are provided:
//!
//! - [`PropertyBinding`] evaluates a closure, pushes the result to a target
//!   and re-evaluates whenever one of the observed values changes.
//! - [`BindingMediator`] forwards changes to a named handler of some other
//!   binding, so one binding can keep several independent subscriptions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::collection::ObservedCollection;
use crate::flags::{BindingMode, LifecycleFlags};
use crate::index_map::IndexMap;
use crate::logging::targets;
use crate::observer::{ObservableObject, ObserverLocator};
use crate::record::{BindingObserverRecord, BindingTarget, Dependency};
use crate::subscriber::{CollectionSubscriber, Subscriber, Value};

/// Dependency tracking for bindings.
pub trait Connectable: Send + Sync {
    /// The record holding this binding's subscriptions.
    fn observer_record(&self) -> &BindingObserverRecord;

    /// The locator used to resolve observers.
    fn observer_locator(&self) -> ObserverLocator {
        ObserverLocator::new()
    }

    /// Observe `key` on `object` for the current evaluation.
    fn observe(&self, object: &ObservableObject, key: &str) {
        let observer = self.observer_locator().get_observer(object, key);
        self.observer_record().add(Dependency::Value(observer));
    }

    /// Observe a collection for the current evaluation.
    fn observe_collection(&self, collection: &dyn ObservedCollection) {
        let observer = self.observer_locator().get_collection_observer(collection);
        self.observer_record().add(Dependency::Collection(observer));
    }

    /// Record an already resolved observer.
    fn subscribe_to(&self, dependency: Dependency) {
        self.observer_record().add(dependency);
    }
}

type ChangeHandler = dyn Fn(&Value, &Value, LifecycleFlags) + Send + Sync;

/// Forwards observed changes to a handler belonging to another binding.
pub struct BindingMediator {
    key: String,
    handler: Box<ChangeHandler>,
    record: BindingObserverRecord,
}

impl BindingMediator {
    /// Create a mediator named `key` that calls `handler` on every change.
    pub fn new(
        key: impl Into<String>,
        handler: impl Fn(&Value, &Value, LifecycleFlags) + Send + Sync + 'static,
    ) -> Arc<Self> {
        let key = key.into();
        Arc::new_cyclic(|this: &Weak<Self>| {
            let target: Weak<dyn BindingTarget> = this.clone();
            Self {
                key,
                handler: Box::new(handler),
                record: BindingObserverRecord::new(target),
            }
        })
    }

    /// The name of the handler this mediator forwards to.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Subscriber for BindingMediator {
    fn handle_change(&self, new_value: &Value, previous_value: &Value, flags: LifecycleFlags) {
        (self.handler)(new_value, previous_value, flags);
    }
}

impl CollectionSubscriber for BindingMediator {
    fn handle_collection_change(&self, _index_map: &IndexMap, flags: LifecycleFlags) {
        (self.handler)(&Value::Null, &Value::Null, flags);
    }
}

impl Connectable for BindingMediator {
    fn observer_record(&self) -> &BindingObserverRecord {
        &self.record
    }
}

impl fmt::Debug for BindingMediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingMediator")
            .field("key", &self.key)
            .field("record", &self.record)
            .finish()
    }
}

type Evaluator = dyn Fn(&dyn Connectable) -> Value + Send + Sync;
type TargetUpdater = dyn Fn(&Value, LifecycleFlags) + Send + Sync;

/// A one-way binding from an evaluated expression to a target.
///
/// The expression is a closure that reads through the supplied
/// [`Connectable`]; whatever it observes becomes a dependency for the next
/// change. Dependencies that are no longer read are dropped after each pass.
///
/// A [`BindingMode::ONE_TIME`] binding updates its target once on `bind`
/// and keeps no subscriptions. A binding without `TO_VIEW`, `ONE_TIME` or
/// `DEFAULT` never updates its target.
pub struct PropertyBinding {
    evaluate: Box<Evaluator>,
    update_target: Box<TargetUpdater>,
    mode: BindingMode,
    record: BindingObserverRecord,
    value: RwLock<Value>,
    bound: AtomicBool,
    persistent_flags: Mutex<LifecycleFlags>,
}

impl PropertyBinding {
    /// Create an unbound [`BindingMode::TO_VIEW`] binding.
    pub fn new(
        evaluate: impl Fn(&dyn Connectable) -> Value + Send + Sync + 'static,
        update_target: impl Fn(&Value, LifecycleFlags) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_mode(BindingMode::TO_VIEW, evaluate, update_target)
    }

    /// Create an unbound binding propagating in `mode`.
    pub fn with_mode(
        mode: BindingMode,
        evaluate: impl Fn(&dyn Connectable) -> Value + Send + Sync + 'static,
        update_target: impl Fn(&Value, LifecycleFlags) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let target: Weak<dyn BindingTarget> = this.clone();
            Self {
                evaluate: Box::new(evaluate),
                update_target: Box::new(update_target),
                mode,
                record: BindingObserverRecord::new(target),
                value: RwLock::new(Value::Null),
                bound: AtomicBool::new(false),
                persistent_flags: Mutex::new(LifecycleFlags::NONE),
            }
        })
    }

    /// The direction(s) the binding propagates in.
    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    fn updates_target(&self) -> bool {
        self.mode
            .intersects(BindingMode::ONE_TIME | BindingMode::TO_VIEW | BindingMode::DEFAULT)
    }

    /// Whether the binding is bound.
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    /// The last value pushed to the target.
    pub fn value(&self) -> Value {
        self.value.read().clone()
    }

    /// Bind: evaluate, subscribe to what was read and update the target.
    pub fn bind(&self, flags: LifecycleFlags) {
        if self.bound.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.updates_target() {
            return;
        }
        *self.persistent_flags.lock() = flags.persistent();
        self.refresh(flags | LifecycleFlags::FROM_BIND);
        if self.mode.contains(BindingMode::ONE_TIME) {
            self.record.clear_all();
        }
    }

    /// Unbind: drop every subscription.
    pub fn unbind(&self, _flags: LifecycleFlags) {
        if !self.bound.swap(false, Ordering::SeqCst) {
            return;
        }
        self.record.clear_all();
        *self.persistent_flags.lock() = LifecycleFlags::NONE;
    }

    /// Re-evaluate now.
    pub fn refresh(&self, flags: LifecycleFlags) {
        self.record.next_version();
        let value = (self.evaluate)(self);
        self.record.clear();

        let changed = {
            let mut current = self.value.write();
            if *current == value {
                false
            } else {
                *current = value.clone();
                true
            }
        };
        if changed || flags.contains(LifecycleFlags::FROM_BIND) {
            tracing::trace!(
                target: targets::BINDING,
                dependencies = self.record.count(),
                "binding updated target"
            );
            (self.update_target)(&value, flags);
        }
    }

    fn on_change(&self, flags: LifecycleFlags) {
        if !self.is_bound() {
            return;
        }
        let flags = flags | *self.persistent_flags.lock();
        self.refresh(flags - LifecycleFlags::FROM_BIND);
    }
}

impl Subscriber for PropertyBinding {
    fn handle_change(&self, _new_value: &Value, _previous_value: &Value, flags: LifecycleFlags) {
        self.on_change(flags);
    }
}

impl CollectionSubscriber for PropertyBinding {
    fn handle_collection_change(&self, _index_map: &IndexMap, flags: LifecycleFlags) {
        self.on_change(flags);
    }
}

impl Connectable for PropertyBinding {
    fn observer_record(&self) -> &BindingObserverRecord {
        &self.record
    }
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBinding")
            .field("bound", &self.is_bound())
            .field("mode", &self.mode)
            .field("value", &*self.value.read())
            .field("record", &self.record)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ObservableArray;
    use serde_json::json;

    #[test]
    fn test_property_binding_tracks_reads() {
        let object = Arc::new(ObservableObject::from_json(json!({ "first": "Ada", "last": "L" })));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let source = object.clone();
        let sink = seen.clone();
        let binding = PropertyBinding::new(
            move |c| {
                c.observe(&source, "first");
                c.observe(&source, "last");
                let first = source.get("first");
                let last = source.get("last");
                json!(format!("{} {}", first.as_str().unwrap_or(""), last.as_str().unwrap_or("")))
            },
            move |value, _flags| sink.lock().push(value.clone()),
        );

        binding.bind(LifecycleFlags::NONE);
        object.set("last", json!("Lovelace")).unwrap();

        assert_eq!(*seen.lock(), vec![json!("Ada L"), json!("Ada Lovelace")]);
        assert_eq!(binding.observer_record().count(), 2);
    }

    #[test]
    fn test_property_binding_drops_unread_dependencies() {
        let object = Arc::new(ObservableObject::from_json(
            json!({ "use_a": true, "a": 1, "b": 2 }),
        ));
        let source = object.clone();
        let binding = PropertyBinding::new(
            move |c| {
                c.observe(&source, "use_a");
                if source.get("use_a") == json!(true) {
                    c.observe(&source, "a");
                    source.get("a")
                } else {
                    c.observe(&source, "b");
                    source.get("b")
                }
            },
            |_value, _flags| {},
        );

        binding.bind(LifecycleFlags::NONE);
        assert_eq!(binding.value(), json!(1));

        object.set("use_a", json!(false)).unwrap();
        assert_eq!(binding.value(), json!(2));
        assert_eq!(object.observer("a").subscribers().count(), 0);
        assert_eq!(object.observer("b").subscribers().count(), 1);

        binding.unbind(LifecycleFlags::NONE);
        assert_eq!(binding.observer_record().count(), 0);
        object.set("b", json!(3)).unwrap();
        assert_eq!(binding.value(), json!(2));
    }

    #[test]
    fn test_one_time_binding_keeps_no_subscriptions() {
        let object = Arc::new(ObservableObject::from_json(json!({ "title": "Draft" })));
        let source = object.clone();
        let binding = PropertyBinding::with_mode(
            BindingMode::ONE_TIME,
            move |c| {
                c.observe(&source, "title");
                source.get("title")
            },
            |_value, _flags| {},
        );

        binding.bind(LifecycleFlags::NONE);
        object.set("title", json!("Final")).unwrap();

        assert_eq!(binding.mode(), BindingMode::ONE_TIME);
        assert_eq!(binding.value(), json!("Draft"));
        assert_eq!(binding.observer_record().count(), 0);
        assert_eq!(object.observer("title").subscribers().count(), 0);
    }

    #[test]
    fn test_from_view_binding_never_updates_target() {
        let object = Arc::new(ObservableObject::from_json(json!({ "title": "Draft" })));
        let updates = Arc::new(Mutex::new(0));
        let sink = updates.clone();
        let source = object.clone();
        let binding = PropertyBinding::with_mode(
            BindingMode::FROM_VIEW,
            move |c| {
                c.observe(&source, "title");
                source.get("title")
            },
            move |_value, _flags| *sink.lock() += 1,
        );

        binding.bind(LifecycleFlags::NONE);
        object.set("title", json!("Final")).unwrap();

        assert!(binding.is_bound());
        assert_eq!(*updates.lock(), 0);
        assert_eq!(binding.value(), Value::Null);
    }

    #[test]
    fn test_property_binding_observes_collections() {
        let items = Arc::new(ObservableArray::from_vec(vec![1, 2]));
        let source = items.clone();
        let binding = PropertyBinding::new(
            move |c| {
                c.observe_collection(source.as_ref());
                json!(source.len())
            },
            |_value, _flags| {},
        );

        binding.bind(LifecycleFlags::NONE);
        items.push(3);

        assert_eq!(binding.value(), json!(3));
    }

    #[test]
    fn test_mediator_forwards_to_handler() {
        let object = ObservableObject::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let mediator = BindingMediator::new("handle_items_change", move |new, _old, _flags| {
            sink.lock().push(new.clone());
        });

        mediator.observe(&object, "items");
        object.set("items", json!([1])).unwrap();

        assert_eq!(mediator.key(), "handle_items_change");
        assert_eq!(*calls.lock(), vec![json!([1])]);
    }
}
