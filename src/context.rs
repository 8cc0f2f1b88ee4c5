//! Execution context: the single "current tracker" slot of one execution.

use std::cell::{Ref, RefCell};

use crate::object::TrackedObject;
use crate::runtime::Runtime;
use crate::storage::FieldKey;
use crate::tag::Tag;
use crate::tracker::Tracker;

/// Access to tracked fields.
///
/// This trait is implemented by both [`Runtime`] and [`ExecutionContext`],
/// allowing field accessors to work with either.
///
/// - Reads through `Runtime`: no dependency tracking
/// - Reads through `ExecutionContext`: recorded on its current tracker
pub trait Access {
    /// The runtime owning the accessed state.
    fn runtime(&self) -> &Runtime;

    /// Record that `tag` was read.
    fn record(&self, tag: Tag);
}

impl Access for Runtime {
    fn runtime(&self) -> &Runtime {
        self
    }

    #[inline]
    fn record(&self, _tag: Tag) {}
}

/// Holds the current tracker for one logical execution (a thread or task).
///
/// Computations push a fresh tracker on entry and pop it on exit; every
/// tracked read made through this context in between is attributed to it.
/// The context is deliberately not `Sync`: share the [`Runtime`], not the
/// context.
pub struct ExecutionContext {
    runtime: Runtime,
    current: RefCell<Option<Tracker>>,
}

impl Access for ExecutionContext {
    fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    fn record(&self, tag: Tag) {
        ExecutionContext::record(self, tag)
    }
}

impl ExecutionContext {
    pub(crate) fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            current: RefCell::new(None),
        }
    }

    /// The runtime this context reads from.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Install a fresh tracker, returning the previously current one.
    ///
    /// The caller must hand the returned value back to
    /// [`end_tracking`](Self::end_tracking). Prefer [`scope`](Self::scope),
    /// which does so on every exit path.
    pub fn begin_tracking(&self) -> Option<Tracker> {
        let span_id = self.runtime.tracer().new_span_id();
        let previous = self.current.replace(Some(Tracker::new(span_id)));
        self.runtime.tracer().on_tracking_start(span_id);
        previous
    }

    /// Reinstall `previous` and return the tracker it replaces.
    ///
    /// # Panics
    ///
    /// Panics if no tracker is current, which means begin and end calls were
    /// not paired.
    pub fn end_tracking(&self, previous: Option<Tracker>) -> Tracker {
        match self.try_end_tracking(previous) {
            Some(tracker) => tracker,
            None => panic!("end_tracking called without a current tracker"),
        }
    }

    /// Reinstall `previous`, returning the retired tracker if there was one.
    fn try_end_tracking(&self, previous: Option<Tracker>) -> Option<Tracker> {
        let finished = self.current.replace(previous)?;
        self.runtime
            .tracer()
            .on_tracking_end(finished.span_id(), finished.len());
        Some(finished)
    }

    /// The current tracker, if a computation is tracking.
    pub fn current_tracker(&self) -> Option<Ref<'_, Tracker>> {
        Ref::filter_map(self.current.borrow(), Option::as_ref).ok()
    }

    /// Returns true if a computation is tracking.
    pub fn is_tracking(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Add `tag` to the current tracker. A no-op when nothing is tracking.
    pub fn record(&self, tag: Tag) {
        let consumed = match self.current.borrow_mut().as_mut() {
            Some(tracker) => tracker.add(tag).then(|| tracker.span_id()),
            None => None,
        };
        if let Some(span_id) = consumed {
            self.runtime.tracer().on_tag_consumed(span_id, tag);
        }
    }

    /// Begin tracking and return a guard that ends it.
    ///
    /// Dropping the guard, including during unwinding, restores the previous
    /// tracker and discards the new one.
    pub fn scope(&self) -> TrackingScope<'_> {
        TrackingScope {
            previous: Some(self.begin_tracking()),
            cx: self,
        }
    }

    /// Run `f` as a tracked computation.
    ///
    /// Returns its result together with the combined tag of everything it read.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let (sum, tag) = cx.track(|cx| *a.get(cx, &obj) + *b.get(cx, &obj));
    /// let snapshot = runtime.revision(tag);
    /// ```
    pub fn track<R>(&self, f: impl FnOnce(&Self) -> R) -> (R, Tag) {
        let scope = self.scope();
        let value = f(self);
        let tracker = scope.finish();
        (value, tracker.combined_tag(&self.runtime))
    }

    /// Run `f` with no current tracker, so its reads are not recorded.
    pub fn untracked<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let _restore = Suspended {
            saved: self.current.take(),
            cx: self,
        };
        f(self)
    }

    /// Note that a tracked computation read the untracked member `key`.
    ///
    /// With diagnostics enabled, a later
    /// [`Runtime::check_untracked_write`] on the same member fails. Outside a
    /// tracked computation this does nothing.
    pub fn observe_untracked(&self, object: &TrackedObject, key: impl Into<FieldKey>) {
        if self.is_tracking() {
            self.runtime.observe_untracked(object, key.into());
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// Guard returned by [`ExecutionContext::scope`].
#[must_use = "dropping the scope ends tracking immediately"]
pub struct TrackingScope<'a> {
    cx: &'a ExecutionContext,
    previous: Option<Option<Tracker>>,
}

impl TrackingScope<'_> {
    /// End tracking normally, returning the finished tracker.
    pub fn finish(mut self) -> Tracker {
        let previous = self.previous.take().flatten();
        self.cx.end_tracking(previous)
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        // Never panic here: this runs during unwinding too.
        if let Some(previous) = self.previous.take() {
            let ended = self.cx.try_end_tracking(previous);
            debug_assert!(
                ended.is_some() || std::thread::panicking(),
                "tracking scope ended after its tracker was already retired"
            );
        }
    }
}

struct Suspended<'a> {
    cx: &'a ExecutionContext,
    saved: Option<Tracker>,
}

impl Drop for Suspended<'_> {
    fn drop(&mut self) {
        *self.cx.current.borrow_mut() = self.saved.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outside_tracking_is_noop() {
        let runtime = Runtime::new();
        let cx = runtime.context();
        cx.record(runtime.create_tag());
        assert!(!cx.is_tracking());
        assert!(cx.current_tracker().is_none());
    }

    #[test]
    fn test_begin_end_restores_previous() {
        let runtime = Runtime::new();
        let cx = runtime.context();
        let a = runtime.create_tag();
        let b = runtime.create_tag();

        let before = cx.begin_tracking();
        assert!(before.is_none());
        cx.record(a);
        let outer_span = cx.current_tracker().unwrap().span_id();

        let outer = cx.begin_tracking();
        cx.record(b);
        let inner = cx.end_tracking(outer);

        assert_eq!(cx.current_tracker().unwrap().span_id(), outer_span);
        let outer = cx.end_tracking(before);

        assert!(inner.contains(b) && !inner.contains(a));
        assert!(outer.contains(a) && !outer.contains(b));
        assert!(!cx.is_tracking());
    }

    #[test]
    fn test_scope_restores_on_panic() {
        let runtime = Runtime::new();
        let cx = runtime.context();
        let outer = cx.scope();
        let outer_span = cx.current_tracker().unwrap().span_id();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _inner = cx.scope();
            panic!("computation failed");
        }));
        assert!(result.is_err());
        assert_eq!(cx.current_tracker().unwrap().span_id(), outer_span);

        outer.finish();
        assert!(!cx.is_tracking());
    }

    #[test]
    fn test_scope_unwinds_after_manual_end() {
        let runtime = Runtime::new();
        let cx = runtime.context();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = cx.scope();
            cx.end_tracking(None);
            panic!("computation failed");
        }));
        assert!(result.is_err());
        assert!(!cx.is_tracking());
    }

    #[test]
    fn test_record_reports_first_consumption_only() {
        let runtime = Runtime::new();
        let cx = runtime.context();
        let a = runtime.create_tag();

        let len = {
            let scope = cx.scope();
            cx.record(a);
            cx.record(a);
            scope.finish().len()
        };
        assert_eq!(len, 1);
    }

    #[test]
    fn test_track_returns_combined_tag() {
        let runtime = Runtime::new();
        let cx = runtime.context();
        let a = runtime.create_tag();
        let b = runtime.create_tag();

        let ((), none) = cx.track(|_| {});
        assert_eq!(none, Tag::CONSTANT);

        let ((), single) = cx.track(|cx| cx.record(a));
        assert_eq!(single, a);

        let ((), both) = cx.track(|cx| {
            cx.record(a);
            cx.record(b);
            cx.record(a);
        });
        assert_eq!(both, runtime.combine([a, b]));
    }

    #[test]
    fn test_untracked_hides_reads() {
        let runtime = Runtime::new();
        let cx = runtime.context();
        let a = runtime.create_tag();

        let (len, _) = cx.track(|cx| {
            cx.untracked(|cx| {
                assert!(!cx.is_tracking());
                cx.record(a);
            });
            assert!(cx.is_tracking());
            cx.current_tracker().unwrap().len()
        });
        assert_eq!(len, 0);
    }

    #[test]
    fn test_runtime_access_never_records() {
        let runtime = Runtime::new();
        let tag = runtime.create_tag();
        Access::record(&runtime, tag);
        assert!(std::ptr::eq(Access::runtime(&runtime), &runtime));
    }
}
