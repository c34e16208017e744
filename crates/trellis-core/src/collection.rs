//! Observable arrays, sets and maps.
//!
//! Each collection owns a [`CollectionObserver`]. Mutations are recorded in
//! the observer's pending [`IndexMap`]; when the mutation (or the enclosing
//! [`batch`](ObservableArray::batch) call) completes, subscribers receive the
//! map and the observer starts over with a fresh identity map.
//!
//! Sets and maps keep insertion order, and their index maps address items by
//! position in that order.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{ObservationError, ObservationResult};
use crate::flags::{AccessorType, CollectionKind, LifecycleFlags};
use crate::index_map::IndexMap;
use crate::logging::targets;
use crate::subscriber::{CollectionSubscribable, CollectionSubscriber, SubscriberRecord};

/// Observer shared by every kind of observable collection.
pub struct CollectionObserver {
    kind: CollectionKind,
    subscribers: SubscriberRecord<dyn CollectionSubscriber>,
    pending: Mutex<IndexMap>,
    held: AtomicUsize,
}

impl CollectionObserver {
    fn new(kind: CollectionKind, len: usize) -> Arc<Self> {
        Arc::new(Self {
            kind,
            subscribers: SubscriberRecord::new(),
            pending: Mutex::new(IndexMap::new(len)),
            held: AtomicUsize::new(0),
        })
    }

    /// The kind of collection observed.
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// The accessor type for this collection kind.
    pub fn accessor_type(&self) -> AccessorType {
        self.kind.accessor_type()
    }

    /// The subscriber list of this observer.
    pub fn subscribers(&self) -> &SubscriberRecord<dyn CollectionSubscriber> {
        &self.subscribers
    }

    /// A copy of the changes recorded since the last notification.
    pub fn pending_index_map(&self) -> IndexMap {
        self.pending.lock().clone()
    }

    fn record(&self, change: impl FnOnce(&mut IndexMap)) {
        change(&mut self.pending.lock());
    }

    fn hold(&self) {
        self.held.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, len: usize) {
        if self.held.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.flush(len);
        }
    }

    fn changed(&self, len: usize) {
        if self.held.load(Ordering::SeqCst) == 0 {
            self.flush(len);
        }
    }

    fn flush(&self, len: usize) {
        let map = std::mem::replace(&mut *self.pending.lock(), IndexMap::new(len));
        if map.is_identity() {
            return;
        }
        tracing::trace!(
            target: targets::COLLECTION,
            kind = ?self.kind,
            len,
            deleted = map.deleted_items().len(),
            "collection changed"
        );
        self.subscribers.notify_collection(&map, LifecycleFlags::NONE);
    }
}

impl CollectionSubscribable for CollectionObserver {
    fn subscribe(&self, subscriber: Arc<dyn CollectionSubscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Arc<dyn CollectionSubscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }
}

impl fmt::Debug for CollectionObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionObserver")
            .field("kind", &self.kind)
            .field("subscribers", &self.subscribers.count())
            .finish()
    }
}

/// A collection that can hand out its observer.
pub trait ObservedCollection: Send + Sync {
    /// The kind of this collection.
    fn kind(&self) -> CollectionKind;

    /// Number of items.
    fn len(&self) -> usize;

    /// Whether the collection is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The observer that notifies about mutations.
    fn collection_observer(&self) -> Arc<CollectionObserver>;
}

/// An observable list.
pub struct ObservableArray<T> {
    items: RwLock<Vec<T>>,
    observer: Arc<CollectionObserver>,
}

impl<T: Clone + Send + Sync> ObservableArray<T> {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Wrap existing items.
    pub fn from_vec(items: Vec<T>) -> Self {
        let observer = CollectionObserver::new(CollectionKind::Array, items.len());
        Self {
            items: RwLock::new(items),
            observer,
        }
    }

    /// The item at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.read().get(index).cloned()
    }

    /// A copy of all items.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Append an item.
    pub fn push(&self, item: T) {
        let len = {
            let mut items = self.items.write();
            items.push(item);
            self.observer.record(IndexMap::push);
            items.len()
        };
        self.observer.changed(len);
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Option<T> {
        let (item, len) = {
            let mut items = self.items.write();
            let item = items.pop()?;
            let index = items.len();
            self.observer.record(|map| {
                map.remove(index);
            });
            (item, items.len())
        };
        self.observer.changed(len);
        Some(item)
    }

    /// Insert an item at `index`.
    pub fn insert(&self, index: usize, item: T) -> ObservationResult<()> {
        let len = {
            let mut items = self.items.write();
            if index > items.len() {
                return Err(ObservationError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, item);
            self.observer.record(|map| map.insert(index));
            items.len()
        };
        self.observer.changed(len);
        Ok(())
    }

    /// Remove and return the item at `index`.
    pub fn remove(&self, index: usize) -> ObservationResult<T> {
        let (item, len) = {
            let mut items = self.items.write();
            if index >= items.len() {
                return Err(ObservationError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            let item = items.remove(index);
            self.observer.record(|map| {
                map.remove(index);
            });
            (item, items.len())
        };
        self.observer.changed(len);
        Ok(item)
    }

    /// Replace the item at `index`, returning the old one.
    pub fn set(&self, index: usize, item: T) -> ObservationResult<T> {
        let (previous, len) = {
            let mut items = self.items.write();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(ObservationError::IndexOutOfBounds { index, len })?;
            let previous = std::mem::replace(slot, item);
            self.observer.record(|map| {
                map.replace(index);
            });
            (previous, len)
        };
        self.observer.changed(len);
        Ok(previous)
    }

    /// Remove every item.
    pub fn clear(&self) {
        {
            let mut items = self.items.write();
            items.clear();
            self.observer.record(IndexMap::clear);
        }
        self.observer.changed(0);
    }

    /// Reverse the items in place.
    pub fn reverse(&self) {
        let len = {
            let mut items = self.items.write();
            items.reverse();
            let order: Vec<usize> = (0..items.len()).rev().collect();
            self.observer.record(|map| map.reorder(&order));
            items.len()
        };
        self.observer.changed(len);
    }

    /// Sort the items in place with a comparator.
    pub fn sort_by(&self, mut compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        let len = {
            let mut items = self.items.write();
            let mut order: Vec<usize> = (0..items.len()).collect();
            order.sort_by(|&a, &b| compare(&items[a], &items[b]));
            let sorted = order.iter().map(|&from| items[from].clone()).collect();
            *items = sorted;
            self.observer.record(|map| map.reorder(&order));
            items.len()
        };
        self.observer.changed(len);
    }

    /// Reorder the items so that the item now at `order[i]` moves to `i`.
    pub fn permute(&self, order: &[usize]) -> ObservationResult<()> {
        let len = {
            let mut items = self.items.write();
            if !is_permutation(order, items.len()) {
                return Err(ObservationError::InvalidPermutation { len: items.len() });
            }
            let permuted = order.iter().map(|&from| items[from].clone()).collect();
            *items = permuted;
            self.observer.record(|map| map.reorder(order));
            items.len()
        };
        self.observer.changed(len);
        Ok(())
    }

    /// Run several mutations and notify once at the end.
    pub fn batch<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.observer.hold();
        let result = f(self);
        self.observer.release(self.len());
        result
    }
}

impl<T: Clone + Send + Sync> Default for ObservableArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> ObservedCollection for ObservableArray<T> {
    fn kind(&self) -> CollectionKind {
        CollectionKind::Array
    }

    fn len(&self) -> usize {
        self.items.read().len()
    }

    fn collection_observer(&self) -> Arc<CollectionObserver> {
        self.observer.clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.read().iter()).finish()
    }
}

fn is_permutation(order: &[usize], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &index in order {
        match seen.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

/// An observable set of unique values, in insertion order.
pub struct ObservableSet<T> {
    items: RwLock<Vec<T>>,
    observer: Arc<CollectionObserver>,
}

impl<T: Eq + Hash + Clone + Send + Sync> ObservableSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            observer: CollectionObserver::new(CollectionKind::Set, 0),
        }
    }

    /// Whether `value` is in the set.
    pub fn has(&self, value: &T) -> bool {
        self.items.read().contains(value)
    }

    /// Items in insertion order.
    pub fn values(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Add a value. Returns `false` if it was already present.
    pub fn add(&self, value: T) -> bool {
        let len = {
            let mut items = self.items.write();
            if items.contains(&value) {
                return false;
            }
            items.push(value);
            self.observer.record(IndexMap::push);
            items.len()
        };
        self.observer.changed(len);
        true
    }

    /// Remove a value. Returns `false` if it was not present.
    pub fn delete(&self, value: &T) -> bool {
        let len = {
            let mut items = self.items.write();
            let Some(position) = items.iter().position(|item| item == value) else {
                return false;
            };
            items.remove(position);
            self.observer.record(|map| {
                map.remove(position);
            });
            items.len()
        };
        self.observer.changed(len);
        true
    }

    /// Remove every value.
    pub fn clear(&self) {
        {
            let mut items = self.items.write();
            if items.is_empty() {
                return;
            }
            items.clear();
            self.observer.record(IndexMap::clear);
        }
        self.observer.changed(0);
    }

    /// Run several mutations and notify once at the end.
    pub fn batch<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.observer.hold();
        let result = f(self);
        self.observer.release(self.len());
        result
    }
}

impl<T: Eq + Hash + Clone + Send + Sync> Default for ObservableSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone + Send + Sync> ObservedCollection for ObservableSet<T> {
    fn kind(&self) -> CollectionKind {
        CollectionKind::Set
    }

    fn len(&self) -> usize {
        self.items.read().len()
    }

    fn collection_observer(&self) -> Arc<CollectionObserver> {
        self.observer.clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.read().iter()).finish()
    }
}

/// An observable key/value map, in insertion order.
pub struct ObservableMap<K, V> {
    entries: RwLock<Vec<(K, V)>>,
    observer: Arc<CollectionObserver>,
}

impl<K, V> ObservableMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + PartialEq + Send + Sync,
{
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            observer: CollectionObserver::new(CollectionKind::Map, 0),
        }
    }

    /// The value stored under `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Whether `key` is present.
    pub fn has(&self, key: &K) -> bool {
        self.entries.read().iter().any(|(k, _)| k == key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<K> {
        self.entries.read().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.entries.read().clone()
    }

    /// Store `value` under `key`, returning the replaced value.
    ///
    /// Storing a value equal to the current one records nothing.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        let (previous, len) = {
            let mut entries = self.entries.write();
            match entries.iter().position(|(k, _)| *k == key) {
                Some(position) => {
                    if entries[position].1 == value {
                        return Some(value);
                    }
                    let previous = std::mem::replace(&mut entries[position].1, value);
                    self.observer.record(|map| {
                        map.replace(position);
                    });
                    (Some(previous), entries.len())
                }
                None => {
                    entries.push((key, value));
                    self.observer.record(IndexMap::push);
                    (None, entries.len())
                }
            }
        };
        self.observer.changed(len);
        previous
    }

    /// Remove `key`, returning its value.
    pub fn delete(&self, key: &K) -> Option<V> {
        let (value, len) = {
            let mut entries = self.entries.write();
            let position = entries.iter().position(|(k, _)| k == key)?;
            let (_, value) = entries.remove(position);
            self.observer.record(|map| {
                map.remove(position);
            });
            (value, entries.len())
        };
        self.observer.changed(len);
        Some(value)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        {
            let mut entries = self.entries.write();
            if entries.is_empty() {
                return;
            }
            entries.clear();
            self.observer.record(IndexMap::clear);
        }
        self.observer.changed(0);
    }

    /// Run several mutations and notify once at the end.
    pub fn batch<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.observer.hold();
        let result = f(self);
        self.observer.release(self.len());
        result
    }
}

impl<K, V> Default for ObservableMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + PartialEq + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ObservedCollection for ObservableMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + PartialEq + Send + Sync,
{
    fn kind(&self) -> CollectionKind {
        CollectionKind::Map
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn collection_observer(&self) -> Arc<CollectionObserver> {
        self.observer.clone()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ObservableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.read().iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_map::IndexEntry;

    #[derive(Default)]
    struct Recorder {
        maps: Mutex<Vec<IndexMap>>,
    }

    impl CollectionSubscriber for Recorder {
        fn handle_collection_change(&self, index_map: &IndexMap, _flags: LifecycleFlags) {
            self.maps.lock().push(index_map.clone());
        }
    }

    fn watch(collection: &dyn ObservedCollection) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        collection.collection_observer().subscribe(recorder.clone());
        recorder
    }

    #[test]
    fn test_array_push_notifies_insert() {
        let array = ObservableArray::from_vec(vec![1, 2]);
        let recorder = watch(&array);

        array.push(3);

        let maps = recorder.maps.lock();
        assert_eq!(maps.len(), 1);
        assert_eq!(
            maps[0].entries(),
            &[IndexEntry::Moved(0), IndexEntry::Moved(1), IndexEntry::Inserted]
        );
    }

    #[test]
    fn test_array_batch_notifies_once() {
        let array = ObservableArray::from_vec(vec!["a", "b", "c"]);
        let recorder = watch(&array);

        array.batch(|array| {
            array.remove(0).unwrap();
            array.insert(1, "x").unwrap();
        });

        let maps = recorder.maps.lock();
        assert_eq!(maps.len(), 1);
        assert_eq!(
            maps[0].entries(),
            &[IndexEntry::Moved(1), IndexEntry::Inserted, IndexEntry::Moved(2)]
        );
        assert_eq!(maps[0].deleted_items(), &[0]);
        assert_eq!(array.to_vec(), vec!["b", "x", "c"]);
    }

    #[test]
    fn test_array_out_of_bounds() {
        let array: ObservableArray<u8> = ObservableArray::new();
        assert_eq!(
            array.remove(0),
            Err(ObservationError::IndexOutOfBounds { index: 0, len: 0 })
        );
        assert!(array.permute(&[1]).is_err());
    }

    #[test]
    fn test_array_sort_records_permutation() {
        let array = ObservableArray::from_vec(vec![3, 1, 2]);
        let recorder = watch(&array);

        array.sort_by(|a, b| a.cmp(b));

        assert_eq!(array.to_vec(), vec![1, 2, 3]);
        let maps = recorder.maps.lock();
        assert_eq!(
            maps[0].entries(),
            &[IndexEntry::Moved(1), IndexEntry::Moved(2), IndexEntry::Moved(0)]
        );
    }

    #[test]
    fn test_array_reverse() {
        let array = ObservableArray::from_vec(vec![1, 2, 3]);
        array.reverse();
        assert_eq!(array.to_vec(), vec![3, 2, 1]);
    }

    #[test]
    fn test_set_add_and_delete() {
        let set = ObservableSet::new();
        let recorder = watch(&set);

        assert!(set.add("a"));
        assert!(!set.add("a"));
        assert!(set.delete(&"a"));
        assert!(!set.delete(&"a"));

        assert_eq!(recorder.maps.lock().len(), 2);
        assert!(set.is_empty());
    }

    #[test]
    fn test_map_set_replace_and_clear() {
        let map = ObservableMap::new();
        map.set("k", 1);
        let recorder = watch(&map);

        assert_eq!(map.set("k", 1), Some(1));
        assert!(recorder.maps.lock().is_empty());

        assert_eq!(map.set("k", 2), Some(1));
        map.clear();

        let maps = recorder.maps.lock();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].entries(), &[IndexEntry::Inserted]);
        assert_eq!(maps[0].deleted_items(), &[0]);
        assert_eq!(maps[1].deleted_items(), &[0]);
        assert_eq!(map.get(&"k"), None);
    }
}
