//! Development-mode record of untracked members read by tracked computations.

use ahash::HashSet;

use crate::storage::{FieldKey, ObjectId};

/// Untracked (object, member) pairs observed while a tracker was current.
#[derive(Default)]
pub(crate) struct ConsumptionLog {
    reads: HashSet<(ObjectId, FieldKey)>,
}

impl ConsumptionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that a tracked computation read `key` on `object`.
    pub fn observe(&mut self, object: ObjectId, key: FieldKey) {
        self.reads.insert((object, key));
    }

    pub fn observed(&self, object: ObjectId, key: &FieldKey) -> bool {
        self.reads.contains(&(object, key.clone()))
    }

    pub fn release(&mut self, object: ObjectId) {
        self.reads.retain(|(id, _)| *id != object);
    }

    pub fn clear(&mut self) {
        self.reads.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.reads.len()
    }
}
