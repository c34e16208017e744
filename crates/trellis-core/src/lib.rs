//! Reactive observation core for Trellis.
//!
//! This crate provides the dependency-tracking layer the rest of Trellis is
//! built on:
//!
//! - **Observable objects**: property bags whose values can be observed
//! - **Observable collections**: arrays, sets and maps reporting mutations
//!   as [`IndexMap`]s
//! - **Subscriber records**: the subscriber list of every observer
//! - **Binding observer records**: per-binding dependency tables that prune
//!   stale subscriptions after each evaluation
//! - **Connectable bindings**: `observe` / `observe_collection` for bindings
//! - **Batching**: deferred, deduplicated notifications
//!
//! # Binding Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use trellis_core::{Connectable, LifecycleFlags, ObservableObject, PropertyBinding};
//!
//! let model = Arc::new(ObservableObject::from_json(json!({ "count": 1 })));
//!
//! let source = model.clone();
//! let binding = PropertyBinding::new(
//!     move |c| {
//!         c.observe(&source, "count");
//!         json!(source.get("count").as_i64().unwrap_or(0) * 2)
//!     },
//!     |value, _flags| println!("doubled: {value}"),
//! );
//!
//! binding.bind(LifecycleFlags::NONE);
//! model.set("count", json!(5)).unwrap();
//! assert_eq!(binding.value(), json!(10));
//! ```

pub mod batch;
pub mod collection;
pub mod connectable;
mod error;
pub mod flags;
pub mod index_map;
pub mod logging;
pub mod observer;
pub mod record;
pub mod subscriber;

pub use batch::{batch, BatchScope};
pub use collection::{
    CollectionObserver, ObservableArray, ObservableMap, ObservableSet, ObservedCollection,
};
pub use connectable::{BindingMediator, Connectable, PropertyBinding};
pub use error::{ObservationError, ObservationResult};
pub use flags::{AccessorType, BindingMode, CollectionKind, LifecycleFlags};
pub use index_map::{IndexEntry, IndexMap};
pub use logging::PerfSpan;
pub use observer::{ObservableObject, ObserverLocator, PropertyObserver};
pub use record::{BindingObserverRecord, BindingTarget, Dependency};
pub use subscriber::{
    Accessor, CollectionSubscribable, CollectionSubscriber, Observer, Subscribable, Subscriber,
    SubscriberRecord, Value,
};

static_assertions::assert_impl_all!(ObservableObject: Send, Sync);
static_assertions::assert_impl_all!(BindingObserverRecord: Send, Sync);
static_assertions::assert_impl_all!(ObservableArray<Value>: Send, Sync);
static_assertions::assert_not_impl_any!(BatchScope: Send);
