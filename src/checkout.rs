//! Checkout handles: RAII guards over one entry's lock.
//!
//! A handle owns a strong reference to its entry together with the lock
//! guard, so the payload it points at stays alive for as long as the handle
//! does, whatever happens to the store's key space meanwhile. Dropping the
//! handle releases the lock. Only the store can mint a bound handle;
//! `Default` yields an unbound sentinel.

use crate::product::Slot;
use crate::tags::TagSet;
use core::fmt;
use core::ops::{Deref, DerefMut};
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;

pub(crate) type ReadGuard<P> = ArcRwLockReadGuard<RawRwLock, Slot<P>>;
pub(crate) type WriteGuard<P> = ArcRwLockWriteGuard<RawRwLock, Slot<P>>;

/// Shared access to one product's payload and tags.
pub struct ReadHandle<P> {
    guard: Option<ReadGuard<P>>,
}

/// Exclusive access to one product's payload and tags.
pub struct WriteHandle<P> {
    guard: Option<WriteGuard<P>>,
}

impl<P> ReadHandle<P> {
    pub(crate) fn new(guard: ReadGuard<P>) -> Self {
        Self { guard: Some(guard) }
    }

    /// True iff the handle is bound to an entry.
    pub fn is_valid(&self) -> bool {
        self.guard.is_some()
    }

    /// Key the handle was checked out under; `None` for the sentinel.
    pub fn name(&self) -> Option<&str> {
        self.guard.as_deref().map(|s| s.name.as_str())
    }

    pub fn get(&self) -> Option<&P> {
        self.guard.as_deref().and_then(|s| s.payload.as_ref())
    }

    /// Snapshot of the product's tags; `None` for the sentinel.
    pub fn tags(&self) -> Option<TagSet> {
        self.guard.as_deref().and_then(Slot::tags)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.guard.as_deref().is_some_and(|s| s.has_tag(tag))
    }
}

impl<P> WriteHandle<P> {
    pub(crate) fn new(guard: WriteGuard<P>) -> Self {
        Self { guard: Some(guard) }
    }

    /// True iff the handle is bound to an entry.
    pub fn is_valid(&self) -> bool {
        self.guard.is_some()
    }

    /// Key the handle was checked out under; `None` for the sentinel.
    pub fn name(&self) -> Option<&str> {
        self.guard.as_deref().map(|s| s.name.as_str())
    }

    pub fn get(&self) -> Option<&P> {
        self.guard.as_deref().and_then(|s| s.payload.as_ref())
    }

    pub fn get_mut(&mut self) -> Option<&mut P> {
        self.guard.as_deref_mut().and_then(|s| s.payload.as_mut())
    }

    /// Snapshot of the product's tags; `None` for the sentinel.
    pub fn tags(&self) -> Option<TagSet> {
        self.guard.as_deref().and_then(Slot::tags)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.guard.as_deref().is_some_and(|s| s.has_tag(tag))
    }

    fn update_tags<R>(&mut self, f: impl FnOnce(&mut TagSet) -> R) -> Option<R> {
        self.guard.as_deref().and_then(|s| s.update_tags(f))
    }

    /// Returns false on the sentinel or when the tag was already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        self.update_tags(|tags| tags.insert(tag)).unwrap_or(false)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.update_tags(|tags| tags.remove(tag)).unwrap_or(false)
    }

    /// Replace the whole tag set. Returns false on the sentinel.
    pub fn set_tags(&mut self, tags: TagSet) -> bool {
        self.update_tags(|current| *current = tags).is_some()
    }
}

impl<P> Default for ReadHandle<P> {
    fn default() -> Self {
        Self { guard: None }
    }
}

impl<P> Default for WriteHandle<P> {
    fn default() -> Self {
        Self { guard: None }
    }
}

/// # Panics
///
/// Dereferencing an unbound (default) handle panics.
impl<P> Deref for ReadHandle<P> {
    type Target = P;

    fn deref(&self) -> &P {
        match self.get() {
            Some(p) => p,
            None => panic!("dereferenced an unbound ReadHandle"),
        }
    }
}

/// # Panics
///
/// Dereferencing an unbound (default) handle panics.
impl<P> Deref for WriteHandle<P> {
    type Target = P;

    fn deref(&self) -> &P {
        match self.get() {
            Some(p) => p,
            None => panic!("dereferenced an unbound WriteHandle"),
        }
    }
}

impl<P> DerefMut for WriteHandle<P> {
    fn deref_mut(&mut self) -> &mut P {
        match self.get_mut() {
            Some(p) => p,
            None => panic!("dereferenced an unbound WriteHandle"),
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for ReadHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadHandle")
            .field("name", &self.name())
            .field("payload", &self.get())
            .finish()
    }
}

impl<P: fmt::Debug> fmt::Debug for WriteHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteHandle")
            .field("name", &self.name())
            .field("payload", &self.get())
            .finish()
    }
}
