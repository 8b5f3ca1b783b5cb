//! Products: the unit of ingest and extraction, and the lockable slot an
//! entry keeps them in.

use crate::tags::TagSet;
use parking_lot::RwLock;
use std::sync::Arc;

/// A payload together with the tags it carries.
///
/// Ownership moves into the store on `add_or_update` and back out on
/// `extract_product`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Product<P> {
    pub payload: P,
    pub tags: TagSet,
}

impl<P> Product<P> {
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            tags: TagSet::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

/// Tags of one entry behind their own lock. `None` once the entry has been
/// detached.
///
/// Tags change only while the entry's exclusive lock is held, and this lock
/// is held just long enough to read or swap the set. Tag queries take it
/// without touching the entry lock, so they never wait on a checkout.
pub(crate) type SharedTags = Arc<RwLock<Option<TagSet>>>;

/// Contents of one entry, guarded by the entry lock.
///
/// The payload is taken (the slot is detached) while the entry's exclusive
/// lock is held, just before the entry is unlinked from the table. Anyone
/// who resolved the entry earlier and acquires the lock afterward must treat
/// it as gone.
#[derive(Debug)]
pub(crate) struct Slot<P> {
    pub(crate) name: String,
    pub(crate) payload: Option<P>,
    pub(crate) tags: SharedTags,
}

impl<P> Slot<P> {
    pub(crate) fn new(name: String, product: Product<P>) -> Self {
        Self {
            name,
            payload: Some(product.payload),
            tags: Arc::new(RwLock::new(Some(product.tags))),
        }
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.payload.is_none()
    }

    /// Swap in a new payload and tag set.
    pub(crate) fn replace(&mut self, product: Product<P>) {
        self.payload = Some(product.payload);
        *self.tags.write() = Some(product.tags);
    }

    /// Move the contents out, leaving the slot detached.
    pub(crate) fn detach(&mut self) -> Option<Product<P>> {
        let payload = self.payload.take()?;
        let tags = self.tags.write().take().unwrap_or_default();
        Some(Product { payload, tags })
    }

    /// Current tags; `None` when detached.
    pub(crate) fn tags(&self) -> Option<TagSet> {
        self.tags.read().clone()
    }

    pub(crate) fn has_tag(&self, tag: &str) -> bool {
        self.tags.read().as_ref().is_some_and(|t| t.contains(tag))
    }

    /// Apply `f` to the live tag set. The caller holds the exclusive lock.
    pub(crate) fn update_tags<R>(&self, f: impl FnOnce(&mut TagSet) -> R) -> Option<R> {
        self.tags.write().as_mut().map(f)
    }
}
