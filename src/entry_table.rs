//! EntryTable: structural key index with stable handles.
//!
//! Owns the key space of a `Store`. It performs no locking of its own; the
//! store guards it with the structural lock and never mutates a value stored
//! here, only inserts and unlinks them.

use core::hash::BuildHasher;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

/// Generational reference to a slot of an `EntryTable`. A handle taken
/// before a removal never resolves to an entry inserted afterward.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Handle(DefaultKey);

#[derive(Debug)]
struct Slot<V> {
    key: String,
    value: V,
    hash: u64,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) enum InsertError {
    DuplicateKey,
}

pub(crate) struct EntryTable<V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Slot<V>>,
}

impl<V> EntryTable<V> {
    pub(crate) fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<V> Default for EntryTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S: BuildHasher> EntryTable<V, S> {
    pub(crate) fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::new(),
            slots: SlotMap::with_key(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn find(&self, key: &str) -> Option<Handle> {
        let hash = self.hasher.hash_one(key);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|s| s.key == key)
                    .unwrap_or(false)
            })
            .map(|&k| Handle(k))
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    pub(crate) fn get(&self, h: Handle) -> Option<&V> {
        self.slots.get(h.0).map(|s| &s.value)
    }

    /// Look up a value by key.
    pub(crate) fn lookup(&self, key: &str) -> Option<&V> {
        self.find(key).and_then(|h| self.get(h))
    }

    pub(crate) fn insert(&mut self, key: String, value: V) -> Result<Handle, InsertError> {
        let hash = self.hasher.hash_one(key.as_str());
        let slots = &mut self.slots;
        match self.index.entry(
            hash,
            |&k| slots.get(k).map(|s| s.key == key).unwrap_or(false),
            |&k| slots.get(k).map(|s| s.hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(_) => Err(InsertError::DuplicateKey),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let k = slots.insert(Slot { key, value, hash });
                let _ = v.insert(k);
                Ok(Handle(k))
            }
        }
    }

    /// Unlink the slot behind `h`, returning its key and value.
    pub(crate) fn remove(&mut self, h: Handle) -> Option<(String, V)> {
        let k = h.0;
        let slot = self.slots.remove(k)?;
        let _ = self
            .index
            .find_entry(slot.hash, |&kk| kk == k)
            .map(|found| found.remove());
        Some((slot.key, slot.value))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Handle, &str, &V)> + '_ {
        self.slots
            .iter()
            .map(|(k, s)| (Handle(k), s.key.as_str(), &s.value))
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.slots.values().map(|s| s.key.as_str())
    }
}
