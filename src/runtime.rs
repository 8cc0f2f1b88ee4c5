//! Runtime: tag table, registries, field storage and hooks.

use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::context::ExecutionContext;
use crate::diagnostics::ConsumptionLog;
use crate::error::UsageError;
use crate::notify::{ChangeNotifier, NotifierSlot};
use crate::object::TrackedObject;
use crate::registry::TagRegistry;
use crate::revision::{Clock, Revision};
use crate::storage::{FieldKey, FieldState, Lookup, ObjectId, Storage, StoredValue};
use crate::tag::{Tag, TagTable};
use crate::tracer::{NoopTracer, Tracer, TracerObjectKey};

/// Runtime owns every piece of shared autotracking state.
///
/// This is cheap to clone, so you can pass it around by just cloning it.
///
/// # Example
///
/// ```ignore
/// let runtime = Runtime::new();
/// let x = TrackedField::builder("x").initializer(|| 10).build()?;
/// let point = runtime.create_object("Point");
///
/// let cx = runtime.context();
/// let (value, tag) = cx.track(|cx| *x.get(cx, &point));
/// let snapshot = runtime.revision(tag);
///
/// x.set(&runtime, &point, 11);
/// assert!(!runtime.validate(tag, snapshot));
/// ```
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    state: Mutex<State>,
    /// Signalled whenever a field leaves the initializing state.
    initialized: Condvar,
    clock: Clock,
    notifier: NotifierSlot,
    tracer: Arc<dyn Tracer>,
    diagnostics: bool,
}

/// Everything guarded by the runtime lock.
///
/// A tag bump and the reads paired with it always happen under one lock
/// acquisition, which keeps revisions monotonic for concurrent hosts.
struct State {
    tags: TagTable,
    registry: TagRegistry,
    storage: Storage,
    consumed: ConsumptionLog,
}

impl State {
    fn tag_for_object(&mut self, object: ObjectId) -> Tag {
        self.registry.tag_for_object(&mut self.tags, object)
    }

    fn tag_for_field(&mut self, object: ObjectId, key: &FieldKey) -> Tag {
        self.registry.tag_for_field(&mut self.tags, object, key)
    }

    fn dirty_object(&mut self, clock: &Clock, object: ObjectId) {
        self.registry.dirty_object(&mut self.tags, clock, object)
    }

    fn dirty_field(&mut self, clock: &Clock, object: ObjectId, key: &FieldKey) -> Revision {
        self.registry.dirty_field(&mut self.tags, clock, object, key)
    }

    fn release(&mut self, object: ObjectId) -> Option<ahash::HashMap<FieldKey, FieldState>> {
        self.registry.release(&mut self.tags, object);
        self.consumed.release(object);
        self.storage.release(object)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Runtime {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("revision", &self.current_revision())
            .field("diagnostics", &self.inner.diagnostics)
            .finish_non_exhaustive()
    }
}

#[test]
fn test_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<Runtime>();
    assert_sync::<Runtime>();
    assert_send::<TrackedObject>();
    assert_sync::<TrackedObject>();
}

impl Runtime {
    /// Create a new runtime with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new runtime that reports to `tracer`.
    pub fn with_tracer<T: Tracer>(tracer: T) -> Self {
        Self::builder().tracer(tracer).build()
    }

    /// Create a builder for customizing the runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let runtime = Runtime::builder()
    ///     .diagnostics(true)
    ///     .change_notifier(|| schedule_render())
    ///     .build();
    /// ```
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn upgrade(inner: &Weak<RuntimeInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn owns(&self, inner: &Weak<RuntimeInner>) -> bool {
        std::ptr::eq(inner.as_ptr(), Arc::as_ptr(&self.inner))
    }

    pub(crate) fn tracer(&self) -> &dyn Tracer {
        &*self.inner.tracer
    }

    /// Create an execution context owning a fresh tracking slot.
    ///
    /// Use one context per thread or task; contexts are not `Sync`.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.clone())
    }

    /// Returns true if development diagnostics are enabled.
    pub fn diagnostics_enabled(&self) -> bool {
        self.inner.diagnostics
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Create an object that can own tracked fields.
    ///
    /// `label` names the object in diagnostics and tracer events.
    pub fn create_object(&self, label: impl Into<Arc<str>>) -> TrackedObject {
        let label = label.into();
        let id = self.inner.state.lock().storage.allocate();
        TrackedObject::new(id, label, Arc::downgrade(&self.inner))
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.inner.state.lock().storage.len()
    }

    pub(crate) fn release_object(&self, id: ObjectId, label: &Arc<str>) {
        let released = self.inner.state.lock().release(id);
        // Values may own other objects; they are dropped here, outside the lock.
        if released.is_some() {
            drop(released);
            self.inner.initialized.notify_all();
            self.inner
                .tracer
                .on_object_released(&TracerObjectKey::new(label.clone(), id));
        }
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    /// Create a standalone dirtyable tag at the base revision.
    ///
    /// Useful for inputs that are not tracked fields.
    pub fn create_tag(&self) -> Tag {
        self.inner.state.lock().tags.create()
    }

    /// Current revision of `tag`.
    ///
    /// For a combined tag this is the maximum over its members, evaluated now.
    /// A tag freed along with its object reports the current clock value, so
    /// a snapshot taken before any later write no longer validates.
    pub fn revision(&self, tag: Tag) -> Revision {
        let revision = self.inner.state.lock().tags.revision(tag);
        revision.unwrap_or_else(|| self.inner.clock.now())
    }

    /// Current value of the revision clock.
    pub fn current_revision(&self) -> Revision {
        self.inner.clock.now()
    }

    /// Returns true if nothing `tag` denotes changed after `snapshot`.
    pub fn validate(&self, tag: Tag, snapshot: Revision) -> bool {
        self.revision(tag) <= snapshot
    }

    /// Bump a dirtyable tag, returning its new revision.
    ///
    /// Constant and combined tags cannot be bumped; for them this returns
    /// `None` and changes nothing.
    pub fn bump(&self, tag: Tag) -> Option<Revision> {
        self.inner.state.lock().tags.bump(tag, &self.inner.clock)
    }

    /// Combine tags into one tag that changes whenever any of them changes.
    ///
    /// An empty input yields [`Tag::CONSTANT`] and a single tag is returned
    /// unchanged.
    pub fn combine(&self, tags: impl IntoIterator<Item = Tag>) -> Tag {
        self.inner.state.lock().tags.combine(tags)
    }

    /// Returns true if `tag` can be bumped (it is neither constant nor combined).
    pub fn is_dirtyable(&self, tag: Tag) -> bool {
        self.inner.state.lock().tags.is_dirtyable(tag)
    }

    /// Number of live tags, including the constant tag.
    pub fn tag_count(&self) -> usize {
        self.inner.state.lock().tags.len()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Tag that changes whenever any tracked field of `object` is written.
    pub fn tag_for_object(&self, object: &TrackedObject) -> Tag {
        self.inner.state.lock().tag_for_object(object.id())
    }

    /// Tag that changes whenever `key` on `object` is written.
    pub fn tag_for_field(&self, object: &TrackedObject, key: impl Into<FieldKey>) -> Tag {
        let key = key.into();
        self.inner.state.lock().tag_for_field(object.id(), &key)
    }

    /// Bump the object's tag.
    pub fn dirty_object(&self, object: &TrackedObject) {
        self.inner
            .state
            .lock()
            .dirty_object(&self.inner.clock, object.id());
    }

    /// Bump the field's tag and its object's tag.
    pub fn dirty_field(&self, object: &TrackedObject, key: impl Into<FieldKey>) -> Revision {
        let key = key.into();
        self.inner
            .state
            .lock()
            .dirty_field(&self.inner.clock, object.id(), &key)
    }

    // ------------------------------------------------------------------
    // Change notification
    // ------------------------------------------------------------------

    /// Replace the change notifier, returning the previous one.
    ///
    /// The notifier is invoked with no arguments after every tracked write.
    pub fn set_change_notifier<F>(&self, notifier: F) -> ChangeNotifier
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.notifier.replace(Arc::new(notifier))
    }

    // ------------------------------------------------------------------
    // Field protocol
    // ------------------------------------------------------------------

    /// Read a field, running `init` if it is uninitialized.
    ///
    /// Returns the stored value, if any, and the field's tag; recording the
    /// tag is left to the caller. `init` runs at most once per field: other
    /// threads reading the field meanwhile wait for its result. It runs
    /// without the state lock held, so it may read other fields.
    ///
    /// # Panics
    ///
    /// Panics if `init` reads the field it is initializing.
    pub(crate) fn read_field<F>(
        &self,
        object: &TrackedObject,
        key: &FieldKey,
        init: Option<F>,
    ) -> (Option<StoredValue>, Tag)
    where
        F: FnOnce() -> StoredValue,
    {
        debug_assert!(
            object.belongs_to(self),
            "{} was created by a different runtime",
            object
        );
        let id = object.id();
        let this_thread = std::thread::current().id();

        let mut state = self.inner.state.lock();
        let tag = state.tag_for_field(id, key);
        loop {
            match state.storage.lookup(id, key) {
                Lookup::Ready(value) => return (Some(value), tag),
                Lookup::Initializing(thread) if thread == this_thread => {
                    drop(state);
                    panic!("initializer of `{}` on {} reads the field it initializes", key, object);
                }
                Lookup::Initializing(_) => self.inner.initialized.wait(&mut state),
                Lookup::Empty => break,
            }
        }
        let Some(init) = init else {
            return (None, tag);
        };
        let claimed = state.storage.begin_init(id, key, this_thread);
        drop(state);
        if !claimed {
            return (Some(init()), tag);
        }

        let pending = PendingInit {
            runtime: self,
            id,
            key,
            done: false,
        };
        let (value, initialized) = pending.complete(init());
        if initialized {
            self.inner
                .tracer
                .on_field_initialized(&object.tracer_key(), key);
        }
        (Some(value), tag)
    }

    /// Write a field: dirty its tags, store the value, then notify.
    pub(crate) fn write_field(&self, object: &TrackedObject, key: &FieldKey, value: StoredValue) {
        debug_assert!(
            object.belongs_to(self),
            "{} was created by a different runtime",
            object
        );
        let id = object.id();
        let (revision, replaced) = {
            let mut state = self.inner.state.lock();
            let revision = state.dirty_field(&self.inner.clock, id, key);
            let replaced = state.storage.insert(id, key.clone(), value);
            (revision, replaced)
        };
        drop(replaced);
        self.inner.initialized.notify_all();

        self.inner
            .tracer
            .on_field_dirtied(&object.tracer_key(), key, revision);
        self.inner.notifier.notify();
    }

    pub(crate) fn is_field_initialized(&self, object: &TrackedObject, key: &FieldKey) -> bool {
        self.inner
            .state
            .lock()
            .storage
            .get(object.id(), key)
            .is_some()
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub(crate) fn observe_untracked(&self, object: &TrackedObject, key: FieldKey) {
        if !self.inner.diagnostics {
            return;
        }
        self.inner
            .state
            .lock()
            .consumed
            .observe(object.id(), key);
    }

    /// Check that writing the untracked member `key` on `object` is safe.
    ///
    /// Fails with [`UsageError::MutatedAfterRead`] when a tracked computation
    /// read the member (see
    /// [`ExecutionContext::observe_untracked`]) since the last
    /// [`reset_diagnostics`](Self::reset_diagnostics). Always succeeds when
    /// diagnostics are disabled.
    pub fn check_untracked_write(
        &self,
        object: &TrackedObject,
        key: impl Into<FieldKey>,
    ) -> Result<(), UsageError> {
        if !self.inner.diagnostics {
            return Ok(());
        }
        let key = key.into();
        let observed = self.inner.state.lock().consumed.observed(object.id(), &key);
        if !observed {
            return Ok(());
        }
        self.inner
            .tracer
            .on_untracked_mutation(&object.tracer_key(), &key);
        Err(UsageError::MutatedAfterRead {
            object: object.to_string(),
            key,
        })
    }

    /// Forget every untracked read observed so far.
    pub fn reset_diagnostics(&self) {
        self.inner.state.lock().consumed.clear();
    }
}

/// Owns a field's initializing marker until the initializer returns.
///
/// If the initializer unwinds, the marker is cleared so another reader can
/// retry.
struct PendingInit<'a> {
    runtime: &'a Runtime,
    id: ObjectId,
    key: &'a FieldKey,
    done: bool,
}

impl PendingInit<'_> {
    fn complete(mut self, value: StoredValue) -> (StoredValue, bool) {
        self.done = true;
        let stored = self
            .runtime
            .inner
            .state
            .lock()
            .storage
            .finish_init(self.id, self.key, value);
        self.runtime.inner.initialized.notify_all();
        stored
    }
}

impl Drop for PendingInit<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.runtime
                .inner
                .state
                .lock()
                .storage
                .abandon_init(self.id, self.key);
            self.runtime.inner.initialized.notify_all();
        }
    }
}

/// Builder for [`Runtime`].
pub struct RuntimeBuilder {
    tracer: Arc<dyn Tracer>,
    diagnostics: bool,
    notifier: Option<ChangeNotifier>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Create a new builder with default settings.
    ///
    /// Diagnostics default to on in debug builds and off otherwise.
    pub fn new() -> Self {
        Self {
            tracer: Arc::new(NoopTracer),
            diagnostics: cfg!(debug_assertions),
            notifier: None,
        }
    }

    /// Set the tracer receiving tracking events.
    pub fn tracer<T: Tracer>(mut self, tracer: T) -> Self {
        self.tracer = Arc::new(tracer);
        self
    }

    /// Enable or disable development diagnostics.
    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Set the initial change notifier.
    pub fn change_notifier<F>(mut self, notifier: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Runtime {
        Runtime {
            inner: Arc::new(RuntimeInner {
                state: Mutex::new(State {
                    tags: TagTable::new(),
                    registry: TagRegistry::new(),
                    storage: Storage::new(),
                    consumed: ConsumptionLog::new(),
                }),
                initialized: Condvar::new(),
                clock: Clock::new(),
                notifier: NotifierSlot::new(self.notifier),
                tracer: self.tracer,
                diagnostics: self.diagnostics,
            }),
        }
    }
}
