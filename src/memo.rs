//! Memoized tracked computations.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::ExecutionContext;
use crate::revision::Revision;
use crate::tag::Tag;

type Compute<T> = Box<dyn Fn(&ExecutionContext) -> T + Send + Sync>;

/// A computation whose result is cached until something it read changes.
///
/// Reading a memo records its combined tag on the caller's tracker, so an
/// outer computation that reads an inner memo depends on everything the inner
/// one read. Recomputation is pulled: a dirtied memo re-runs on its next
/// [`get`](Self::get), never eagerly.
///
/// # Example
///
/// ```ignore
/// let full_name = Memo::new(move |cx| {
///     format!("{} {}", first.get(cx, &person), last.get(cx, &person))
/// });
///
/// assert_eq!(*full_name.get(&cx), "Ada Lovelace");
/// ```
pub struct Memo<T> {
    compute: Compute<T>,
    state: Mutex<Option<MemoState<T>>>,
}

struct MemoState<T> {
    value: Arc<T>,
    tag: Tag,
    /// Clock value when the cached value started computing.
    verified_at: Revision,
}

impl<T: Send + Sync + 'static> Memo<T> {
    /// Wrap `compute`. Nothing runs until the first [`get`](Self::get).
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&ExecutionContext) -> T + Send + Sync + 'static,
    {
        Self {
            compute: Box::new(compute),
            state: Mutex::new(None),
        }
    }

    /// Return the cached value, recomputing it if any dependency changed.
    pub fn get(&self, cx: &ExecutionContext) -> Arc<T> {
        let runtime = cx.runtime();
        let cached = self
            .state
            .lock()
            .as_ref()
            .map(|state| (state.value.clone(), state.tag, state.verified_at));
        if let Some((value, tag, verified_at)) = cached {
            if runtime.validate(tag, verified_at) {
                cx.record(tag);
                return value;
            }
        }

        // Writes made while computing land after `verified_at` and invalidate.
        let verified_at = runtime.current_revision();
        let (value, tag) = cx.track(|cx| (self.compute)(cx));
        let value = Arc::new(value);
        let stale = self.state.lock().replace(MemoState {
            value: value.clone(),
            tag,
            verified_at,
        });
        drop(stale);
        cx.record(tag);
        value
    }

    /// Combined tag of the last computation, if it ran.
    pub fn tag(&self) -> Option<Tag> {
        self.state.lock().as_ref().map(|state| state.tag)
    }

    /// Returns true if the last computation read nothing, so it never
    /// needs to re-run.
    pub fn is_const(&self) -> bool {
        self.tag() == Some(Tag::CONSTANT)
    }

    /// Revision at which the cached value was last computed.
    pub fn revision(&self) -> Option<Revision> {
        self.state.lock().as_ref().map(|state| state.verified_at)
    }

    /// Drop the cached value so the next read recomputes.
    pub fn clear(&self) {
        let stale = self.state.lock().take();
        drop(stale);
    }
}

impl<T> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Memo")
            .field("tag", &state.as_ref().map(|state| state.tag))
            .field("revision", &state.as_ref().map(|state| state.verified_at))
            .finish_non_exhaustive()
    }
}
