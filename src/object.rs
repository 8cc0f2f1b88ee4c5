//! Handles to objects that own tracked fields.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::runtime::{Runtime, RuntimeInner};
use crate::storage::ObjectId;
use crate::tracer::TracerObjectKey;

/// Shared handle to an object owning tracked fields.
///
/// Cheap to clone. When the last clone is dropped, the object's arena slot,
/// stored values and tags are reclaimed. The handle does not keep its runtime
/// alive.
#[derive(Clone)]
pub struct TrackedObject {
    handle: Arc<ObjectHandle>,
}

struct ObjectHandle {
    id: ObjectId,
    label: Arc<str>,
    runtime: Weak<RuntimeInner>,
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        if let Some(runtime) = Runtime::upgrade(&self.runtime) {
            runtime.release_object(self.id, &self.label);
        }
    }
}

impl TrackedObject {
    pub(crate) fn new(id: ObjectId, label: Arc<str>, runtime: Weak<RuntimeInner>) -> Self {
        Self {
            handle: Arc::new(ObjectHandle { id, label, runtime }),
        }
    }

    /// Arena identity of this object.
    pub fn id(&self) -> ObjectId {
        self.handle.id
    }

    /// Label the object was created with.
    pub fn label(&self) -> &str {
        &self.handle.label
    }

    pub(crate) fn tracer_key(&self) -> TracerObjectKey {
        TracerObjectKey::new(self.handle.label.clone(), self.handle.id)
    }

    /// Returns true if this object was created by `runtime`.
    pub fn belongs_to(&self, runtime: &Runtime) -> bool {
        runtime.owns(&self.handle.runtime)
    }
}

impl PartialEq for TrackedObject {
    fn eq(&self, other: &Self) -> bool {
        self.handle.id == other.handle.id && Weak::ptr_eq(&self.handle.runtime, &other.handle.runtime)
    }
}

impl Eq for TrackedObject {}

impl fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedObject")
            .field("id", &self.handle.id)
            .field("label", &self.handle.label)
            .finish()
    }
}

impl fmt::Display for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.handle.label, self.handle.id)
    }
}
