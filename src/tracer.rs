//! Tracer trait for observing dependency tracking.
//!
//! This module defines the [`Tracer`] trait and related types for observing
//! tracking, reads and writes. The default [`NoopTracer`] costs nothing when
//! tracing is not needed.
//!
//! # Example
//!
//! ```ignore
//! use autotrack::{Runtime, SpanId, Tag, Tracer, TracerObjectKey, FieldKey};
//!
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn new_span_id(&self) -> SpanId {
//!         SpanId(1)
//!     }
//!
//!     fn on_field_dirtied(&self, object: &TracerObjectKey, key: &FieldKey, revision: u64) {
//!         println!("{object}.{key} -> r{revision}");
//!     }
//! }
//!
//! let runtime = Runtime::builder().tracer(PrintTracer).build();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::revision::Revision;
use crate::storage::{FieldKey, ObjectId};
use crate::tag::Tag;

/// Unique identifier for one tracking frame (one tracker's lifetime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(pub u64);

/// Names an object in tracer callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TracerObjectKey {
    /// Label the object was created with (e.g. "Person").
    pub label: Arc<str>,
    /// Arena identity of the object.
    pub id: ObjectId,
}

impl TracerObjectKey {
    /// Create a new tracer object key.
    #[inline]
    pub fn new(label: impl Into<Arc<str>>, id: ObjectId) -> Self {
        Self {
            label: label.into(),
            id,
        }
    }
}

impl fmt::Display for TracerObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.id)
    }
}

/// Tracer trait for observing autotracking.
///
/// Implementations can collect events for testing, forward to a logging
/// framework, or provide custom observability.
///
/// All methods except [`new_span_id`](Tracer::new_span_id) have empty default
/// implementations. Callbacks never run while the runtime's state lock is
/// held, so they may read from the runtime.
pub trait Tracer: Send + Sync + 'static {
    /// Generate a new unique span ID. Called when a tracker is created.
    fn new_span_id(&self) -> SpanId;

    /// Called when a tracker becomes current.
    #[inline]
    fn on_tracking_start(&self, _span_id: SpanId) {}

    /// Called when a tracker is retired, with the number of distinct tags it observed.
    #[inline]
    fn on_tracking_end(&self, _span_id: SpanId, _dependencies: usize) {}

    /// Called the first time a tag is recorded on a tracker.
    #[inline]
    fn on_tag_consumed(&self, _span_id: SpanId, _tag: Tag) {}

    /// Called when a field's initializer result is stored.
    #[inline]
    fn on_field_initialized(&self, _object: &TracerObjectKey, _key: &FieldKey) {}

    /// Called after a tracked write, with the field tag's new revision.
    #[inline]
    fn on_field_dirtied(&self, _object: &TracerObjectKey, _key: &FieldKey, _revision: Revision) {}

    /// Called when an object's storage is reclaimed.
    #[inline]
    fn on_object_released(&self, _object: &TracerObjectKey) {}

    /// Called when an untracked member is written after a tracked computation read it.
    #[inline]
    fn on_untracked_mutation(&self, _object: &TracerObjectKey, _key: &FieldKey) {}
}

/// Zero-cost tracer that discards all events.
///
/// This is the default tracer for [`Runtime`](crate::Runtime).
pub struct NoopTracer;

/// Global span counter for NoopTracer.
static NOOP_SPAN_COUNTER: AtomicU64 = AtomicU64::new(1);

impl Tracer for NoopTracer {
    #[inline(always)]
    fn new_span_id(&self) -> SpanId {
        SpanId(NOOP_SPAN_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
