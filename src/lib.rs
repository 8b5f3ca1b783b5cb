//! product-store: a concurrent registry of named, tagged data products
//! with per-product read/write checkout.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: let many pipeline stages share a pool of mutable products
//!   without a single global bottleneck.
//! - Layers:
//!   - EntryTable: structural key index (slotmap storage + hashbrown
//!     `HashTable`) with stable generational handles; no locking.
//!   - Store<P>: wraps the table in the structural `RwLock` and keeps
//!     each product in its own `Arc<RwLock<Slot<P>>>` (the entry lock).
//!   - ReadHandle / WriteHandle: owned guards over one entry lock; they
//!     hold the `Arc`, so a handle can never outlive its payload.
//!
//! Constraints
//! - Thread-safe: `Store<P>` is `Send + Sync` when `P: Send + Sync`.
//! - Per-entry locking independent of the structural lock: operations on
//!   different keys never block each other beyond brief table access.
//! - Blocking acquisition only; no timeouts or cancellation.
//!
//! Lock order
//! - The structural lock is held only to resolve keys, link/unlink cells
//!   or read tags, never while waiting for an entry lock.
//! - Tag locks are leaves: nothing else is acquired while one is held.
//! - Replace and remove take the entry's exclusive lock first, then the
//!   structural lock. Removal therefore waits for outstanding checkouts.
//! - Multi-entry operations deduplicate keys and lock in ascending key
//!   order; handles come back in that order, not the caller's.
//!
//! Removal and stale lookups
//! - A removed slot is detached (payload taken) while its exclusive lock
//!   is held, then unlinked. A checkout that resolved the cell before the
//!   removal sees the detached slot once it gets the lock and resolves the
//!   key again, which reports `NotFound` unless the key was re-added.
//!
//! Tags
//! - Each entry's tags sit behind their own short-held lock, shared by the
//!   slot and the table. Tags change only while the entry's exclusive lock
//!   is held (write handles, replace, remove), so a read handle sees stable
//!   tags. Tag queries read them under the structural read lock and never
//!   touch an entry lock, so they finish while any handle is held.
//!
//! Misuse
//! - Asking the store for an entry lock that conflicts with a handle the
//!   same thread already holds (e.g. `remove(k)` while holding a handle on
//!   `k`) blocks forever, as with any non-reentrant lock. Name and tag
//!   queries are safe to call while holding handles.
//!
//! Around the store
//! - `fields`: named field access for payload types.
//! - `bundle`: per-event inputs passed to stages.
//! - `stage`: the `Stage` trait, a factory by type name, a `Pipeline`
//!   runner and two built-in stages.

mod bundle;
mod checkout;
mod entry_table;
#[cfg(test)]
mod entry_table_proptest;
mod error;
mod fields;
mod product;
pub mod stage;
mod store;
mod tags;

// Public surface
pub use bundle::{BundleError, InputBundle, InputValue, WrongKind};
pub use checkout::{ReadHandle, WriteHandle};
pub use error::StoreError;
pub use fields::{FieldAccess, FieldRegistry, FieldValue};
pub use product::Product;
pub use store::Store;
pub use tags::{tag_set, TagQuery, TagSet};
