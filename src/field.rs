//! Tracked field accessors.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::class::ClassDescriptor;
use crate::context::Access;
use crate::error::ConfigError;
use crate::object::TrackedObject;
use crate::storage::{FieldKey, StoredValue};
use crate::tag::Tag;

type Initializer<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Get/set accessor pair for one tracked field.
///
/// A field is keyed by name and applies to any [`TrackedObject`]: the value
/// lives in the runtime's storage, not in the accessor. Reads record the
/// field's tag on the current tracker and lazily run the initializer; writes
/// dirty the field and its object, store the value, then fire the change
/// notifier.
///
/// # Example
///
/// ```ignore
/// let count = TrackedField::builder("count").initializer(|| 0u32).build()?;
/// let counter = runtime.create_object("Counter");
///
/// assert_eq!(*count.get(&runtime, &counter), 0);
/// count.set(&runtime, &counter, 1);
/// ```
pub struct TrackedField<T> {
    key: FieldKey,
    init: Option<Initializer<T>>,
}

impl<T> Clone for TrackedField<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            init: self.init.clone(),
        }
    }
}

impl<T> fmt::Debug for TrackedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedField")
            .field("key", &self.key)
            .field("type", &std::any::type_name::<T>())
            .field("has_initializer", &self.init.is_some())
            .finish()
    }
}

impl<T: Default + Send + Sync + 'static> TrackedField<T> {
    /// Build a field initialized with `T::default()`.
    pub fn new(key: impl Into<FieldKey>) -> Result<Self, ConfigError> {
        Self::builder(key).default_initializer().build()
    }
}

impl<T: Send + Sync + 'static> TrackedField<T> {
    /// Start building a field named `key`.
    pub fn builder(key: impl Into<FieldKey>) -> FieldBuilder<T> {
        FieldBuilder {
            key: key.into(),
            init: None,
            _marker: PhantomData,
        }
    }

    /// The field's key.
    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    /// Read the field, running the initializer on first access.
    ///
    /// The field's tag is recorded on `access` whether or not the initializer
    /// ran.
    ///
    /// # Panics
    ///
    /// Panics if the field has no initializer and was never written on
    /// `object` (use [`try_get`](Self::try_get) for such fields), if the
    /// initializer reads the field itself, or if another accessor stored a
    /// value of a different type under the same key on `object`.
    pub fn get<A: Access + ?Sized>(&self, access: &A, object: &TrackedObject) -> Arc<T> {
        match self.try_get(access, object) {
            Some(value) => value,
            None => panic!(
                "`{}` on {} was read before it was written and has no initializer",
                self.key, object
            ),
        }
    }

    /// Read the field, or `None` if it has no initializer and was never
    /// written on `object`.
    ///
    /// The field's tag is recorded either way, so a later first write
    /// invalidates the reader.
    pub fn try_get<A: Access + ?Sized>(
        &self,
        access: &A,
        object: &TrackedObject,
    ) -> Option<Arc<T>> {
        let init = self.init.as_ref().map(|init| {
            move || {
                let fresh: StoredValue = Arc::new(init());
                fresh
            }
        });
        let (value, tag) = access.runtime().read_field(object, &self.key, init);
        access.record(tag);
        value.map(|value| self.downcast(object, value))
    }

    /// Returns true if the field has an initializer.
    pub fn has_initializer(&self) -> bool {
        self.init.is_some()
    }

    /// Write the field.
    ///
    /// Dirties the field's tag and its object's tag, stores `value`, then
    /// invokes the runtime's change notifier.
    pub fn set<A: Access + ?Sized>(&self, access: &A, object: &TrackedObject, value: T) {
        access
            .runtime()
            .write_field(object, &self.key, Arc::new(value));
    }

    /// The field's tag on `object`. Does not record anything.
    pub fn tag<A: Access + ?Sized>(&self, access: &A, object: &TrackedObject) -> Tag {
        access.runtime().tag_for_field(object, &self.key)
    }

    /// Returns true if the field holds a value on `object`. Does not record
    /// anything or run the initializer.
    pub fn is_initialized<A: Access + ?Sized>(&self, access: &A, object: &TrackedObject) -> bool {
        access.runtime().is_field_initialized(object, &self.key)
    }

    fn downcast(&self, object: &TrackedObject, value: StoredValue) -> Arc<T> {
        match value.downcast::<T>() {
            Ok(value) => value,
            Err(_) => panic!(
                "`{}` on {} does not hold a value of type {}",
                self.key,
                object,
                std::any::type_name::<T>()
            ),
        }
    }
}

/// Builder for [`TrackedField`].
///
/// Validation happens once, in [`build`](Self::build) or
/// [`install`](Self::install), never on a read or write.
pub struct FieldBuilder<T> {
    key: FieldKey,
    init: Option<Initializer<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> FieldBuilder<T> {
    /// Set the zero-argument initializer run on first read.
    ///
    /// Optional: a field without one must be written before
    /// [`TrackedField::get`] reads it.
    pub fn initializer<F>(mut self, init: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Initialize with `T::default()`.
    pub fn default_initializer(self) -> Self
    where
        T: Default,
    {
        self.initializer(T::default)
    }

    /// Validate and build the accessor.
    pub fn build(self) -> Result<TrackedField<T>, ConfigError> {
        if self.key.as_str().is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        Ok(TrackedField {
            key: self.key,
            init: self.init,
        })
    }

    /// Build the accessor and mark its member tracked on `class`.
    ///
    /// Fails if the member is a computed accessor or is already tracked.
    pub fn install(self, class: &mut ClassDescriptor) -> Result<TrackedField<T>, ConfigError> {
        let field = self.build()?;
        class.mark_tracked(&field.key)?;
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_build_errors() {
        let err = TrackedField::<i32>::builder("").initializer(|| 1).build().unwrap_err();
        assert_eq!(err, ConfigError::EmptyKey);

    }

    struct Handle(u32);

    #[test]
    fn test_field_without_initializer() {
        let handle = TrackedField::<Handle>::builder("handle").build().unwrap();
        assert!(!handle.has_initializer());

        let runtime = Runtime::new();
        let cx = runtime.context();
        let socket = runtime.create_object("Socket");

        let (missing, tag) = cx.track(|cx| handle.try_get(cx, &socket).map(|h| h.0));
        assert_eq!(missing, None);
        assert_eq!(tag, handle.tag(&runtime, &socket));
        assert!(!handle.is_initialized(&runtime, &socket));

        let snapshot = runtime.revision(tag);
        handle.set(&runtime, &socket, Handle(7));
        assert!(!runtime.validate(tag, snapshot));
        assert_eq!(handle.get(&cx, &socket).0, 7);
        assert_eq!(handle.try_get(&runtime, &socket).map(|h| h.0), Some(7));
    }

    #[test]
    #[should_panic(expected = "was read before it was written and has no initializer")]
    fn test_get_without_initializer_panics() {
        let handle = TrackedField::<Handle>::builder("handle").build().unwrap();
        let runtime = Runtime::new();
        let socket = runtime.create_object("Socket");
        handle.get(&runtime, &socket);
    }

    #[test]
    #[should_panic(expected = "reads the field it initializes")]
    fn test_self_reading_initializer_panics() {
        let runtime = Runtime::new();
        let object = runtime.create_object("Obj");
        let inner = TrackedField::builder("x").initializer(|| 1).build().unwrap();
        let outer = {
            let (runtime, object) = (runtime.clone(), object.clone());
            TrackedField::builder("x")
                .initializer(move || *inner.get(&runtime, &object) + 1)
                .build()
                .unwrap()
        };
        outer.get(&runtime, &object);
    }

    #[test]
    fn test_panicking_initializer_can_be_retried() {
        let runtime = Runtime::new();
        let object = runtime.create_object("Obj");
        let attempts = Arc::new(AtomicUsize::new(0));
        let flaky = {
            let attempts = attempts.clone();
            TrackedField::builder("flaky")
                .initializer(move || {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("first attempt fails");
                    }
                    3
                })
                .build()
                .unwrap()
        };

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            flaky.get(&runtime, &object);
        }));
        assert!(first.is_err());
        assert!(!flaky.is_initialized(&runtime, &object));
        assert_eq!(*flaky.get(&runtime, &object), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_initializer_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let x = TrackedField::builder("x")
            .initializer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                10
            })
            .build()
            .unwrap();

        let runtime = Runtime::new();
        let point = runtime.create_object("Point");
        assert!(!x.is_initialized(&runtime, &point));
        assert_eq!(*x.get(&runtime, &point), 10);
        assert_eq!(*x.get(&runtime, &point), 10);
        assert!(x.is_initialized(&runtime, &point));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_before_read_skips_initializer() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let name = TrackedField::builder("name")
            .initializer(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                String::from("anonymous")
            })
            .build()
            .unwrap();

        let runtime = Runtime::new();
        let person = runtime.create_object("Person");
        name.set(&runtime, &person, "Ada".to_string());
        assert_eq!(*name.get(&runtime, &person), "Ada");
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_objects_do_not_share_values() {
        let x = TrackedField::<i32>::new("x").unwrap();
        let runtime = Runtime::new();
        let a = runtime.create_object("Point");
        let b = runtime.create_object("Point");

        x.set(&runtime, &a, 5);
        assert_eq!(*x.get(&runtime, &a), 5);
        assert_eq!(*x.get(&runtime, &b), 0);
        assert_ne!(x.tag(&runtime, &a), x.tag(&runtime, &b));
    }

    #[test]
    fn test_get_records_tag_on_context() {
        let x = TrackedField::<i32>::new("x").unwrap();
        let runtime = Runtime::new();
        let point = runtime.create_object("Point");
        let cx = runtime.context();

        let (_, tag) = cx.track(|cx| x.get(cx, &point));
        assert_eq!(tag, x.tag(&runtime, &point));
    }

    #[test]
    fn test_initializer_may_read_other_fields() {
        let first = TrackedField::builder("first")
            .initializer(|| 2)
            .build()
            .unwrap();
        let runtime = Runtime::new();
        let object = runtime.create_object("Obj");
        let second = {
            let first = first.clone();
            let runtime = runtime.clone();
            let object = object.clone();
            TrackedField::builder("second")
                .initializer(move || *first.get(&runtime, &object) * 10)
                .build()
                .unwrap()
        };

        assert_eq!(*second.get(&runtime, &object), 20);
    }

    #[test]
    #[should_panic(expected = "does not hold a value of type")]
    fn test_type_mismatch_panics() {
        let as_int = TrackedField::<i32>::new("value").unwrap();
        let as_text = TrackedField::<String>::new("value").unwrap();
        let runtime = Runtime::new();
        let object = runtime.create_object("Obj");

        as_int.set(&runtime, &object, 1);
        as_text.get(&runtime, &object);
    }
}
