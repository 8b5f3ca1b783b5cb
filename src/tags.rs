//! Tag sets and the set predicates used by tag queries.
//!
//! Empty query sets follow the usual vacuous-truth rules: no entry matches
//! "any of nothing", every entry matches "all of nothing".

use std::collections::BTreeSet;

/// Free-form labels attached to a product.
pub type TagSet = BTreeSet<String>;

/// Build a `TagSet` from anything yielding string-like items.
pub fn tag_set<I, T>(tags: I) -> TagSet
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    tags.into_iter().map(Into::into).collect()
}

/// A predicate over an entry's tag set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TagQuery<'a> {
    /// Entry has at least one of the tags.
    Any(&'a TagSet),
    /// Entry has every one of the tags.
    All(&'a TagSet),
    /// Entry's tags equal the set exactly.
    Exact(&'a TagSet),
    /// Entry has none of the tags.
    NoneOf(&'a TagSet),
    /// Entry carries the given tag.
    Has(&'a str),
    /// Entry does not carry the given tag.
    Lacks(&'a str),
    /// Entry has no tags at all.
    Untagged,
}

impl TagQuery<'_> {
    pub fn matches(&self, tags: &TagSet) -> bool {
        match *self {
            TagQuery::Any(q) => q.iter().any(|t| tags.contains(t)),
            TagQuery::All(q) => q.iter().all(|t| tags.contains(t)),
            TagQuery::Exact(q) => tags == q,
            TagQuery::NoneOf(q) => !q.iter().any(|t| tags.contains(t)),
            TagQuery::Has(t) => tags.contains(t),
            TagQuery::Lacks(t) => !tags.contains(t),
            TagQuery::Untagged => tags.is_empty(),
        }
    }
}
