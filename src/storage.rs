//! Side-table storage for tracked field values.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;

use ahash::HashMap;
use serde::{Deserialize, Serialize};
use slab::Slab;

/// Type-erased stored field value.
pub(crate) type StoredValue = Arc<dyn Any + Send + Sync>;

/// Stable name of a field.
///
/// Cheap to clone: the name is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey(Arc<str>);

impl FieldKey {
    /// Create a new field key.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FieldKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&FieldKey> for FieldKey {
    fn from(key: &FieldKey) -> Self {
        key.clone()
    }
}

/// Identity of a tracked object: its arena slot plus a generation.
///
/// The generation distinguishes an object from a later one that reuses the
/// same slot after the first was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    slot: u32,
    generation: u32,
}

impl ObjectId {
    /// Arena slot of this object.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Generation of the slot when this object was created.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slot)?;
        if self.generation > 0 {
            write!(f, ".{}", self.generation)?;
        }
        Ok(())
    }
}

/// State of one field on one object.
pub(crate) enum FieldState {
    Ready(StoredValue),
    /// The initializer is running on the given thread.
    Initializing(ThreadId),
}

/// Result of looking a field up.
pub(crate) enum Lookup {
    Ready(StoredValue),
    Initializing(ThreadId),
    /// Uninitialized, or the object is gone.
    Empty,
}

struct ObjectSlot {
    generation: u32,
    fields: HashMap<FieldKey, FieldState>,
}

/// Arena of per-object field tables.
pub(crate) struct Storage {
    slots: Slab<ObjectSlot>,
    next_generation: u32,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    pub fn new() -> Self {
        Self {
            slots: Slab::new(),
            next_generation: 0,
        }
    }

    /// Allocate an empty slot for a new object.
    pub fn allocate(&mut self) -> ObjectId {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        let slot = self.slots.insert(ObjectSlot {
            generation,
            fields: HashMap::default(),
        });
        let slot = match u32::try_from(slot) {
            Ok(slot) => slot,
            Err(_) => panic!("object arena is full: more than {} live objects", u32::MAX),
        };
        ObjectId { slot, generation }
    }

    fn slot(&self, id: ObjectId) -> Option<&ObjectSlot> {
        self.slots
            .get(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    fn slot_mut(&mut self, id: ObjectId) -> Option<&mut ObjectSlot> {
        self.slots
            .get_mut(id.slot as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    /// Returns true if `id` names a live object.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.slot(id).is_some()
    }

    /// Stored value of a field, if initialized.
    pub fn get(&self, id: ObjectId, key: &FieldKey) -> Option<StoredValue> {
        match self.lookup(id, key) {
            Lookup::Ready(value) => Some(value),
            Lookup::Initializing(_) | Lookup::Empty => None,
        }
    }

    /// Current state of a field.
    pub fn lookup(&self, id: ObjectId, key: &FieldKey) -> Lookup {
        match self.slot(id).and_then(|slot| slot.fields.get(key)) {
            Some(FieldState::Ready(value)) => Lookup::Ready(value.clone()),
            Some(FieldState::Initializing(thread)) => Lookup::Initializing(*thread),
            None => Lookup::Empty,
        }
    }

    /// Store a value unconditionally, returning the value it replaced.
    ///
    /// Hands `value` back as `Err` if `id` is not live. Replaced values are
    /// returned rather than dropped so the caller can drop them after
    /// releasing its lock. A write overrides a running initializer.
    pub fn insert(
        &mut self,
        id: ObjectId,
        key: FieldKey,
        value: StoredValue,
    ) -> Result<Option<StoredValue>, StoredValue> {
        match self.slot_mut(id) {
            Some(slot) => match slot.fields.insert(key, FieldState::Ready(value)) {
                Some(FieldState::Ready(replaced)) => Ok(Some(replaced)),
                Some(FieldState::Initializing(_)) | None => Ok(None),
            },
            None => Err(value),
        }
    }

    /// Mark an empty field as being initialized by `thread`.
    ///
    /// Returns false if the object is gone or the field is not empty.
    pub fn begin_init(&mut self, id: ObjectId, key: &FieldKey, thread: ThreadId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        if slot.fields.contains_key(key) {
            return false;
        }
        slot.fields
            .insert(key.clone(), FieldState::Initializing(thread));
        true
    }

    /// Store an initializer's result unless the field was written meanwhile.
    ///
    /// Returns the value now held by the field and whether `value` was
    /// stored. For an object released meanwhile the value is handed back
    /// without being stored.
    pub fn finish_init(
        &mut self,
        id: ObjectId,
        key: &FieldKey,
        value: StoredValue,
    ) -> (StoredValue, bool) {
        let Some(slot) = self.slot_mut(id) else {
            return (value, false);
        };
        match slot.fields.get_mut(key) {
            Some(FieldState::Ready(existing)) => (existing.clone(), false),
            Some(state) => {
                *state = FieldState::Ready(value.clone());
                (value, true)
            }
            None => {
                slot.fields
                    .insert(key.clone(), FieldState::Ready(value.clone()));
                (value, true)
            }
        }
    }

    /// Clear an initialization marker left by an initializer that panicked.
    pub fn abandon_init(&mut self, id: ObjectId, key: &FieldKey) {
        if let Some(slot) = self.slot_mut(id) {
            if matches!(slot.fields.get(key), Some(FieldState::Initializing(_))) {
                slot.fields.remove(key);
            }
        }
    }

    /// Release an object's slot, returning the field states it held.
    pub fn release(&mut self, id: ObjectId) -> Option<HashMap<FieldKey, FieldState>> {
        if self.contains(id) {
            Some(self.slots.remove(id.slot as usize).fields)
        } else {
            None
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
