//! Tracker: the set of tags observed during one computation.

use ahash::HashSet;

use crate::runtime::Runtime;
use crate::tag::Tag;
use crate::tracer::SpanId;

/// Accumulates the tags read during exactly one computation's execution.
///
/// A tracker has no parent: nested computations get their own tracker and
/// their reads are not propagated outward. An outer computation depends on an
/// inner one by reading the inner one's output, which records the inner
/// combined tag (see [`Memo`](crate::Memo)).
#[derive(Debug)]
pub struct Tracker {
    span_id: SpanId,
    tags: HashSet<Tag>,
    last: Option<Tag>,
}

impl Tracker {
    /// Create an empty tracker.
    pub fn new(span_id: SpanId) -> Self {
        Self {
            span_id,
            tags: HashSet::default(),
            last: None,
        }
    }

    /// Span identifying this tracker in tracer events.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Add `tag` to the observed set.
    ///
    /// Returns true if the tag was not observed before. The constant tag is
    /// never added: depending on it has no effect.
    pub fn add(&mut self, tag: Tag) -> bool {
        if tag.is_constant() || self.last == Some(tag) {
            return false;
        }
        self.last = Some(tag);
        self.tags.insert(tag)
    }

    /// Returns true if `tag` was observed.
    pub fn contains(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// Most recently added tag.
    pub fn last(&self) -> Option<Tag> {
        self.last
    }

    /// Observed tags, in no particular order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.tags.iter().copied()
    }

    /// Number of distinct observed tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns true if nothing was observed.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Collapse the observed set into one tag.
    pub fn combined_tag(&self, runtime: &Runtime) -> Tag {
        match (self.tags.len(), self.last) {
            (0, _) => Tag::CONSTANT,
            (1, Some(last)) => last,
            _ => runtime.combine(self.tags()),
        }
    }
}
