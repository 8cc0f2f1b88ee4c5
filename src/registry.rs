//! Lazily populated object and field tag registries.

use ahash::HashMap;

use crate::revision::{Clock, Revision};
use crate::storage::{FieldKey, ObjectId};
use crate::tag::{Tag, TagTable};

/// Maps objects, and (object, field) pairs, to their dedicated tags.
///
/// Absence of an entry means the tag was never observed; it is created at the
/// base revision on first access.
#[derive(Default)]
pub(crate) struct TagRegistry {
    objects: HashMap<ObjectId, Tag>,
    fields: HashMap<ObjectId, HashMap<FieldKey, Tag>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag for "this object changed at all".
    pub fn tag_for_object(&mut self, tags: &mut TagTable, object: ObjectId) -> Tag {
        *self.objects.entry(object).or_insert_with(|| tags.create())
    }

    /// Tag for "this field of this object changed".
    pub fn tag_for_field(&mut self, tags: &mut TagTable, object: ObjectId, key: &FieldKey) -> Tag {
        let fields = self.fields.entry(object).or_default();
        if let Some(tag) = fields.get(key) {
            return *tag;
        }
        let tag = tags.create();
        fields.insert(key.clone(), tag);
        tag
    }

    /// Existing field tag, without creating one.
    #[cfg(test)]
    pub fn existing_field_tag(&self, object: ObjectId, key: &FieldKey) -> Option<Tag> {
        self.fields.get(&object)?.get(key).copied()
    }

    /// Bump the object's tag.
    pub fn dirty_object(&mut self, tags: &mut TagTable, clock: &Clock, object: ObjectId) {
        let tag = self.tag_for_object(tags, object);
        tags.bump(tag, clock);
    }

    /// Bump the field's tag and its object's tag.
    ///
    /// Returns the field tag's new revision.
    pub fn dirty_field(
        &mut self,
        tags: &mut TagTable,
        clock: &Clock,
        object: ObjectId,
        key: &FieldKey,
    ) -> Revision {
        let field = self.tag_for_field(tags, object, key);
        let revision = tags.bump(field, clock).unwrap_or_default();
        self.dirty_object(tags, clock, object);
        revision
    }

    /// Forget and free every tag belonging to `object`.
    pub fn release(&mut self, tags: &mut TagTable, object: ObjectId) {
        if let Some(tag) = self.objects.remove(&object) {
            tags.free(tag);
        }
        if let Some(fields) = self.fields.remove(&object) {
            for tag in fields.into_values() {
                tags.free(tag);
            }
        }
    }
}
