//! Index maps describing how a collection changed.
//!
//! An [`IndexMap`] has one entry per item in the *new* collection. Entry `i`
//! holds the index the item had in the *old* collection, or
//! [`IndexEntry::Inserted`] when the item is new. Items that were removed are
//! listed in [`IndexMap::deleted_items`] by their old index (arrays) or by
//! their old position in iteration order (sets and maps).
//!
//! Collection observers keep one map per batch of mutations and hand it to
//! their subscribers when notifying.

use std::fmt;
use std::ops::Index;

/// A single entry of an [`IndexMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexEntry {
    /// The item at this position was at the given index before the change.
    Moved(usize),
    /// The item at this position was inserted by the change.
    Inserted,
}

impl IndexEntry {
    /// The old index, if the item existed before the change.
    pub fn old_index(self) -> Option<usize> {
        match self {
            Self::Moved(index) => Some(index),
            Self::Inserted => None,
        }
    }
}

/// A sparse permutation of collection indices plus the deleted items.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct IndexMap {
    entries: Vec<IndexEntry>,
    deleted_items: Vec<usize>,
}

impl IndexMap {
    /// Create the identity map for a collection of `length` items.
    ///
    /// Every entry maps to itself and nothing is deleted.
    pub fn new(length: usize) -> Self {
        Self {
            entries: (0..length).map(IndexEntry::Moved).collect(),
            deleted_items: Vec::new(),
        }
    }

    /// Build a map from existing entries, copying the given deleted items.
    pub fn from_parts(entries: &[IndexEntry], deleted_items: &[usize]) -> Self {
        Self {
            entries: entries.to_vec(),
            deleted_items: deleted_items.to_vec(),
        }
    }

    /// Number of items in the new collection.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the new collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry at `index`, if any.
    pub fn get(&self, index: usize) -> Option<IndexEntry> {
        self.entries.get(index).copied()
    }

    /// All entries in new-collection order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Old indices (or keys' positions) of the removed items.
    pub fn deleted_items(&self) -> &[usize] {
        &self.deleted_items
    }

    /// Mutable access to the removed items.
    pub fn deleted_items_mut(&mut self) -> &mut Vec<usize> {
        &mut self.deleted_items
    }

    /// Whether the map describes no change at all.
    pub fn is_identity(&self) -> bool {
        self.deleted_items.is_empty()
            && self
                .entries
                .iter()
                .enumerate()
                .all(|(i, entry)| *entry == IndexEntry::Moved(i))
    }

    /// Record an insertion at `index`.
    ///
    /// Indices past the end are clamped to an append.
    pub fn insert(&mut self, index: usize) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, IndexEntry::Inserted);
    }

    /// Record an append.
    pub fn push(&mut self) {
        self.entries.push(IndexEntry::Inserted);
    }

    /// Record the removal of the item at `index`.
    ///
    /// Items that existed before the change are added to the deleted list;
    /// removing an item that was inserted within the same batch leaves no
    /// trace. Returns `false` when `index` is out of range.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.entries.len() {
            return false;
        }
        if let IndexEntry::Moved(old) = self.entries.remove(index) {
            self.deleted_items.push(old);
        }
        true
    }

    /// Record that the item at `index` was replaced by a new one.
    pub fn replace(&mut self, index: usize) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) => {
                if let IndexEntry::Moved(old) = *entry {
                    self.deleted_items.push(old);
                }
                *entry = IndexEntry::Inserted;
                true
            }
            None => false,
        }
    }

    /// Record that the items were reordered.
    ///
    /// `order[i]` is the current position of the item that is now at `i`.
    pub fn reorder(&mut self, order: &[usize]) {
        let previous = std::mem::take(&mut self.entries);
        self.entries = order
            .iter()
            .filter_map(|&from| previous.get(from).copied())
            .collect();
    }

    /// Record that every item was removed.
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            if let IndexEntry::Moved(old) = entry {
                self.deleted_items.push(old);
            }
        }
    }
}

impl Index<usize> for IndexMap {
    type Output = IndexEntry;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl fmt::Debug for IndexMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<i64> = self
            .entries
            .iter()
            .map(|entry| match entry {
                IndexEntry::Moved(index) => *index as i64,
                IndexEntry::Inserted => -2,
            })
            .collect();
        f.debug_struct("IndexMap")
            .field("entries", &entries)
            .field("deleted_items", &self.deleted_items)
            .finish()
    }
}
