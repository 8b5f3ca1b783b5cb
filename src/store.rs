//! Store: the concurrent registry of named products.
//!
//! Lock tiers:
//! - the structural lock guards the `EntryTable` (key space only);
//! - each entry has its own lock guarding its payload;
//! - each entry's tags sit behind a separate short-held tag lock. Tags
//!   change only under the entry's exclusive lock.
//!
//! Nothing waits on an entry lock while holding the structural lock. Paths
//! needing both (replace, remove) take the entry lock first. Tag locks are
//! leaves: they may be taken under either of the other locks, and nothing
//! else is acquired while one is held, so tag queries never wait on a
//! checkout. Multi-entry paths lock entries in ascending key order.

use crate::checkout::{ReadHandle, WriteHandle};
use crate::entry_table::EntryTable;
use crate::error::StoreError;
use crate::product::{Product, SharedTags, Slot};
use crate::tags::{TagQuery, TagSet};
use core::fmt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

type Cell<P> = Arc<RwLock<Slot<P>>>;

/// What the table keeps per key: the entry lock and the entry's tags.
/// Both point at the same shared state the slot owns.
struct Entry<P> {
    cell: Cell<P>,
    tags: SharedTags,
}

impl<P> Entry<P> {
    fn new(name: String, product: Product<P>) -> Self {
        let slot = Slot::new(name, product);
        let tags = slot.tags.clone();
        Self {
            cell: Arc::new(RwLock::new(slot)),
            tags,
        }
    }

    /// Whether the entry is live and its tags satisfy `query`.
    fn matches(&self, query: &TagQuery<'_>) -> bool {
        self.tags.read().as_ref().is_some_and(|t| query.matches(t))
    }
}

impl<P> Clone for Entry<P> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Registry of named, tagged, individually lockable products.
pub struct Store<P> {
    table: RwLock<EntryTable<Entry<P>>>,
}

impl<P> Default for Store<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Store<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("len", &self.len()).finish()
    }
}

impl<P> Store<P> {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(EntryTable::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    fn resolve(&self, key: &str) -> Option<Cell<P>> {
        self.table.read().lookup(key).map(|e| e.cell.clone())
    }

    /// Resolve a deduplicated, sorted key set under one structural read lock.
    fn resolve_sorted<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Cell<P>>, StoreError> {
        let sorted: BTreeSet<&str> = keys.iter().map(|k| k.as_ref()).collect();
        let table = self.table.read();
        sorted
            .into_iter()
            .map(|k| {
                table
                    .lookup(k)
                    .map(|e| e.cell.clone())
                    .ok_or_else(|| StoreError::NotFound(k.to_string()))
            })
            .collect()
    }

    /// Every `(key, cell)` pair present right now, in ascending key order.
    fn snapshot(&self) -> Vec<(String, Cell<P>)> {
        let mut entries: Vec<(String, Cell<P>)> = {
            let table = self.table.read();
            table
                .iter()
                .map(|(_, k, e)| (k.to_string(), e.cell.clone()))
                .collect()
        };
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Link a fresh entry. The caller holds the structural write lock and
    /// has just seen `key` absent.
    fn link(table: &mut EntryTable<Entry<P>>, key: String, product: Product<P>) {
        let inserted = table.insert(key.clone(), Entry::new(key, product));
        debug_assert!(inserted.is_ok(), "linked a key that was already present");
    }

    /// Unlink `cell` if it is still the entry registered under `key`.
    /// The caller holds the cell's write lock and has already detached it.
    fn unlink(table: &mut EntryTable<Entry<P>>, key: &str, cell: &Cell<P>) {
        if let Some(h) = table.find(key) {
            if table.get(h).is_some_and(|e| Arc::ptr_eq(&e.cell, cell)) {
                table.remove(h);
            }
        }
    }

    // ---- ingest ----

    /// Insert `product` under `key`, or replace the payload and tags of the
    /// existing entry. Replacement waits until every outstanding checkout of
    /// that entry has been released; only an insert takes the structural
    /// write lock. `None` is logged and ignored.
    pub fn add_or_update(&self, key: impl Into<String>, product: impl Into<Option<Product<P>>>) {
        let key = key.into();
        let Some(product) = product.into() else {
            warn!(product = %key, "tried to add or update a product without a payload");
            return;
        };
        loop {
            let existing = match self.resolve(&key) {
                Some(cell) => cell,
                None => {
                    let mut table = self.table.write();
                    // Someone may have linked it between the two locks.
                    match table.lookup(&key) {
                        Some(e) => e.cell.clone(),
                        None => {
                            Self::link(&mut table, key, product);
                            return;
                        }
                    }
                }
            };
            let mut slot = existing.write();
            if slot.is_detached() {
                // Removed between lookup and lock; go around and insert fresh.
                continue;
            }
            slot.replace(product);
            return;
        }
    }

    /// Apply `add_or_update` to every pair. New keys are linked in one
    /// structural critical section; existing entries are then locked in key
    /// order and replaced together. `None` items are skipped. When a key
    /// repeats, the last pair wins.
    pub fn add_or_update_multiple<I, K, T>(&self, products: I)
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Option<Product<P>>>,
    {
        let mut pending: BTreeMap<String, Product<P>> = BTreeMap::new();
        for (key, product) in products {
            let key = key.into();
            match product.into() {
                Some(product) => {
                    pending.insert(key, product);
                }
                None => warn!(product = %key, "skipping product without a payload"),
            }
        }

        let mut cells: Vec<(String, Cell<P>)> = Vec::new();
        let mut replacements: Vec<Product<P>> = Vec::new();
        {
            let mut table = self.table.write();
            for (key, product) in pending {
                match table.lookup(&key) {
                    Some(e) => {
                        cells.push((key, e.cell.clone()));
                        replacements.push(product);
                    }
                    None => Self::link(&mut table, key, product),
                }
            }
        }

        let mut guards: Vec<_> = cells.iter().map(|(_, cell)| cell.write()).collect();
        let mut retry = Vec::new();
        for ((slot, (key, _)), product) in guards.iter_mut().zip(&cells).zip(replacements) {
            if slot.is_detached() {
                retry.push((key.clone(), product));
            } else {
                slot.replace(product);
            }
        }
        drop(guards);

        for (key, product) in retry {
            self.add_or_update(key, product);
        }
    }

    // ---- removal ----

    /// Lock each cell in the given order, detach those still live and
    /// accepted by `accept`, then unlink them in one structural critical
    /// section. Returns the detached products in the same order.
    fn remove_cells<F>(&self, cells: &[(String, Cell<P>)], accept: F) -> Vec<(String, Product<P>)>
    where
        F: Fn(&Slot<P>) -> bool,
    {
        let mut guards: Vec<_> = cells.iter().map(|(_, cell)| cell.write()).collect();
        let mut removed = Vec::new();
        let mut unlinked = Vec::new();
        for (slot, (key, cell)) in guards.iter_mut().zip(cells) {
            if slot.is_detached() || !accept(&**slot) {
                continue;
            }
            if let Some(product) = slot.detach() {
                removed.push((key.clone(), product));
                unlinked.push((key.as_str(), cell));
            }
        }
        if !unlinked.is_empty() {
            let mut table = self.table.write();
            for (key, cell) in unlinked {
                Self::unlink(&mut table, key, cell);
            }
        }
        drop(guards);
        removed
    }

    /// Detach and unlink one entry, waiting for its outstanding checkouts.
    fn take(&self, key: &str) -> Option<Product<P>> {
        loop {
            let cell = self.resolve(key)?;
            let mut slot = cell.write();
            if slot.is_detached() {
                continue;
            }
            let product = slot.detach();
            Self::unlink(&mut self.table.write(), key, &cell);
            return product;
        }
    }

    /// Remove `key`, blocking until its checkouts are released. Removing an
    /// absent key is a no-op. Returns whether an entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.take(key).is_some()
    }

    /// Remove every listed key that exists. Returns how many were removed.
    pub fn remove_multiple<K: AsRef<str>>(&self, keys: &[K]) -> usize {
        let sorted: BTreeSet<&str> = keys.iter().map(|k| k.as_ref()).collect();
        let cells: Vec<(String, Cell<P>)> = {
            let table = self.table.read();
            sorted
                .into_iter()
                .filter_map(|k| table.lookup(k).map(|e| (k.to_string(), e.cell.clone())))
                .collect()
        };
        self.remove_cells(&cells, |_| true).len()
    }

    /// Remove every entry present when the call starts.
    pub fn clear(&self) -> usize {
        let cells = self.snapshot();
        let removed = self.remove_cells(&cells, |_| true).len();
        debug!(removed, "cleared store");
        removed
    }

    /// Remove `key` and hand its payload and tags back to the caller.
    pub fn extract_product(&self, key: &str) -> Result<Product<P>, StoreError> {
        self.take(key).ok_or_else(|| {
            warn!(product = %key, "tried to extract a product that does not exist");
            StoreError::NotFound(key.to_string())
        })
    }

    // ---- queries ----

    /// Names of all products, in no particular order.
    pub fn get_all_names(&self) -> Vec<String> {
        self.table.read().keys().map(str::to_string).collect()
    }

    pub fn has_product(&self, key: &str) -> bool {
        self.table.read().contains_key(key)
    }

    /// Membership of each key, in input order.
    pub fn has_products<K: AsRef<str>>(&self, keys: &[K]) -> Vec<bool> {
        let table = self.table.read();
        keys.iter().map(|k| table.contains_key(k.as_ref())).collect()
    }

    /// The subset of `keys` that exist, in input order.
    pub fn get_existing_products<K: AsRef<str>>(&self, keys: &[K]) -> Vec<String> {
        let table = self.table.read();
        keys.iter()
            .map(|k| k.as_ref())
            .filter(|k| table.contains_key(k))
            .map(str::to_string)
            .collect()
    }

    // ---- checkout ----

    /// Shared access to one product. Blocks while a writer holds it.
    pub fn checkout_read(&self, key: &str) -> Result<ReadHandle<P>, StoreError> {
        loop {
            let cell = self
                .resolve(key)
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            let guard = cell.read_arc();
            if !guard.is_detached() {
                return Ok(ReadHandle::new(guard));
            }
        }
    }

    /// Exclusive access to one product. Blocks while anyone else holds it.
    pub fn checkout_write(&self, key: &str) -> Result<WriteHandle<P>, StoreError> {
        loop {
            let cell = self
                .resolve(key)
                .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
            let guard = cell.write_arc();
            if !guard.is_detached() {
                return Ok(WriteHandle::new(guard));
            }
        }
    }

    /// Shared access to several products at once.
    ///
    /// Keys are deduplicated and locked in ascending order, and the handles
    /// come back in that order, not in the order given. Use
    /// [`ReadHandle::name`] to re-associate them. If any key is absent
    /// nothing is locked and `NotFound` names the first missing key.
    pub fn checkout_read_multiple<K: AsRef<str>>(
        &self,
        keys: &[K],
    ) -> Result<Vec<ReadHandle<P>>, StoreError> {
        'retry: loop {
            let cells = self.resolve_sorted(keys)?;
            let mut handles = Vec::with_capacity(cells.len());
            for cell in &cells {
                let guard = cell.read_arc();
                if guard.is_detached() {
                    continue 'retry;
                }
                handles.push(ReadHandle::new(guard));
            }
            return Ok(handles);
        }
    }

    /// Exclusive access to several products at once; same ordering rules as
    /// [`Store::checkout_read_multiple`].
    pub fn checkout_write_multiple<K: AsRef<str>>(
        &self,
        keys: &[K],
    ) -> Result<Vec<WriteHandle<P>>, StoreError> {
        'retry: loop {
            let cells = self.resolve_sorted(keys)?;
            let mut handles = Vec::with_capacity(cells.len());
            for cell in &cells {
                let guard = cell.write_arc();
                if guard.is_detached() {
                    continue 'retry;
                }
                handles.push(WriteHandle::new(guard));
            }
            return Ok(handles);
        }
    }

    // ---- tags ----

    /// Names whose tags satisfy `query`, read under the structural read lock
    /// and each entry's tag lock only.
    fn names_matching(&self, query: TagQuery<'_>) -> Vec<String> {
        let mut names: Vec<String> = {
            let table = self.table.read();
            table
                .iter()
                .filter(|(_, _, e)| e.matches(&query))
                .map(|(_, k, _)| k.to_string())
                .collect()
        };
        names.sort_unstable();
        names
    }

    fn remove_matching(&self, query: TagQuery<'_>) -> usize {
        let mut candidates: Vec<(String, Cell<P>)> = {
            let table = self.table.read();
            table
                .iter()
                .filter(|(_, _, e)| e.matches(&query))
                .map(|(_, k, e)| (k.to_string(), e.cell.clone()))
                .collect()
        };
        candidates.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        // Tags may have changed before the entry lock was ours; check again.
        let removed = self
            .remove_cells(&candidates, |slot| {
                slot.tags.read().as_ref().is_some_and(|t| query.matches(t))
            })
            .len();
        debug!(removed, ?query, "removed products by tag");
        removed
    }

    /// Union of every product's tags.
    pub fn get_all_tags(&self) -> TagSet {
        let table = self.table.read();
        let mut all = TagSet::new();
        for (_, _, e) in table.iter() {
            if let Some(tags) = e.tags.read().as_ref() {
                all.extend(tags.iter().cloned());
            }
        }
        all
    }

    pub fn remove_by_tag(&self, tag: &str) -> usize {
        self.remove_matching(TagQuery::Has(tag))
    }

    pub fn remove_excluding_tag(&self, tag: &str) -> usize {
        self.remove_matching(TagQuery::Lacks(tag))
    }

    /// Remove products carrying any of `tags`.
    pub fn remove_by_tags(&self, tags: &TagSet) -> usize {
        self.remove_matching(TagQuery::Any(tags))
    }

    /// Remove products carrying none of `tags`.
    pub fn remove_excluding_tags(&self, tags: &TagSet) -> usize {
        self.remove_matching(TagQuery::NoneOf(tags))
    }

    /// Tag queries return names in ascending order.
    pub fn get_names_with_tag(&self, tag: &str) -> Vec<String> {
        self.names_matching(TagQuery::Has(tag))
    }

    pub fn get_names_with_any_tags(&self, tags: &TagSet) -> Vec<String> {
        self.names_matching(TagQuery::Any(tags))
    }

    pub fn get_names_with_all_tags(&self, tags: &TagSet) -> Vec<String> {
        self.names_matching(TagQuery::All(tags))
    }

    pub fn get_names_with_exact_tags(&self, tags: &TagSet) -> Vec<String> {
        self.names_matching(TagQuery::Exact(tags))
    }

    pub fn get_names_with_no_tags(&self) -> Vec<String> {
        self.names_matching(TagQuery::Untagged)
    }
}

impl<P: Serialize> Store<P> {
    fn serialize_cell(name: &str, cell: &Cell<P>) -> Result<Option<Value>, StoreError> {
        // Recursive so a caller already holding a read handle is not queued
        // behind a waiting writer.
        let slot = cell.read_recursive();
        match slot.payload.as_ref() {
            None => Ok(None),
            Some(payload) => serde_json::to_value(payload)
                .map(Some)
                .map_err(|e| StoreError::Serialization {
                    name: name.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Serialize one product's payload.
    pub fn serialize(&self, key: &str) -> Result<Value, StoreError> {
        let handle = self.checkout_read(key)?;
        serde_json::to_value(&*handle).map_err(|e| StoreError::Serialization {
            name: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Serialize every product into one `name -> payload` document.
    ///
    /// A product that fails to serialize is logged and left out; the rest of
    /// the document is still produced.
    pub fn serialize_all(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (name, cell) in self.snapshot() {
            match Self::serialize_cell(&name, &cell) {
                Ok(Some(value)) => {
                    out.insert(name, value);
                }
                Ok(None) => {}
                Err(err) => error!(product = %name, %err, "skipping product in serialize_all"),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn replaced_entry_keeps_its_cell() {
        let store: Store<i32> = Store::new();
        store.add_or_update("a", Product::new(1));
        let before = store.resolve("a").unwrap();
        store.add_or_update("a", Product::new(2));
        let after = store.resolve("a").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.read().payload, Some(2));

        let table = store.table.read();
        let entry = table.lookup("a").unwrap();
        assert!(Arc::ptr_eq(&entry.tags, &after.read().tags));
    }

    /// Invariant: replacing an existing key needs only the structural read
    /// lock, so it completes while other lookups hold the table.
    #[test]
    fn replacement_runs_under_shared_table_lock() {
        use std::sync::mpsc;
        use std::time::Duration;

        let store: Store<i32> = Store::new();
        store.add_or_update("a", Product::new(1));
        std::thread::scope(|s| {
            let held = store.table.read();
            let (tx, rx) = mpsc::channel();
            let store = &store;
            s.spawn(move || {
                store.add_or_update("a", Product::new(2).with_tag("new"));
                let _ = tx.send(());
            });
            let done = rx.recv_timeout(Duration::from_secs(5));
            drop(held);
            assert!(done.is_ok(), "replacement waited for the structural write lock");
        });
        let h = store.checkout_read("a").unwrap();
        assert_eq!(*h, 2);
        assert!(h.has_tag("new"));
    }

    #[test]
    fn removed_cell_is_detached_and_unlinked() {
        let store: Store<i32> = Store::new();
        store.add_or_update("a", Product::new(1));
        let cell = store.resolve("a").unwrap();
        assert!(store.remove("a"));
        assert!(cell.read().is_detached());
        assert!(store.resolve("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn unlink_ignores_a_newer_cell_under_the_same_key() {
        let store: Store<i32> = Store::new();
        store.add_or_update("a", Product::new(1));
        let stale: Cell<i32> = Arc::new(RwLock::new(Slot::new("a".into(), Product::new(0))));
        Store::unlink(&mut store.table.write(), "a", &stale);
        assert!(store.has_product("a"));
    }

    #[test]
    fn snapshot_is_sorted() {
        let store: Store<i32> = Store::new();
        for k in ["c", "a", "b"] {
            store.add_or_update(k, Product::new(0));
        }
        let keys: Vec<String> = store.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[test]
    #[traced_test]
    fn missing_payload_is_logged_and_ignored() {
        let store: Store<i32> = Store::new();
        store.add_or_update("ghost", None::<Product<i32>>);
        assert!(store.is_empty());
        assert!(logs_contain("without a payload"));
    }

    #[test]
    #[traced_test]
    fn extracting_absent_product_is_logged() {
        let store: Store<i32> = Store::new();
        assert!(store.extract_product("ghost").is_err());
        assert!(logs_contain("does not exist"));
    }
}
