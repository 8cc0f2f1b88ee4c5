//! Revision tags and the revision table behind them.

use ahash::HashMap;
use serde::{Deserialize, Serialize};
use slab::Slab;

use crate::revision::{Clock, Revision, CONSTANT, INITIAL};

/// Opaque handle to a revision tag.
///
/// Tags are small integer handles into their runtime's revision table, so
/// identity comparison, hashing and set membership are plain integer
/// operations. A tag is only meaningful for the runtime that created it.
///
/// Slots of freed tags are reused; the generation tells a live tag from a
/// stale handle to an earlier occupant of the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    index: u32,
    generation: u32,
}

impl Tag {
    /// The distinguished tag whose revision never advances.
    ///
    /// It denotes values with no reactive dependencies.
    pub const CONSTANT: Tag = Tag {
        index: 0,
        generation: 0,
    };

    /// Returns true if this is the constant tag.
    #[inline]
    pub fn is_constant(self) -> bool {
        self == Self::CONSTANT
    }

    /// Raw index into the revision table.
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this tag was allocated.
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

enum TagState {
    Constant,
    Dirtyable(Revision),
    /// Flattened, sorted, deduplicated dirtyable members.
    Combined(Box<[Tag]>),
}

struct TagSlot {
    generation: u32,
    state: TagState,
}

/// Per-runtime revision table.
pub(crate) struct TagTable {
    slots: Slab<TagSlot>,
    next_generation: u32,
    combined: HashMap<Box<[Tag]>, Tag>,
    /// Combined tags each dirtyable tag is a member of.
    dependents: HashMap<Tag, Vec<Tag>>,
}

impl Default for TagTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TagTable {
    pub fn new() -> Self {
        let mut slots = Slab::new();
        // Slot 0 is the constant tag and is never freed.
        slots.insert(TagSlot {
            generation: 0,
            state: TagState::Constant,
        });
        Self {
            slots,
            next_generation: 1,
            combined: HashMap::default(),
            dependents: HashMap::default(),
        }
    }

    /// Allocate a dirtyable tag at the base revision.
    pub fn create(&mut self) -> Tag {
        self.push(TagState::Dirtyable(INITIAL))
    }

    fn push(&mut self, state: TagState) -> Tag {
        let generation = self.next_generation;
        // Generation 0 is reserved for the constant tag.
        self.next_generation = self.next_generation.checked_add(1).unwrap_or(1);
        let index = self.slots.insert(TagSlot { generation, state });
        let index = match u32::try_from(index) {
            Ok(index) => index,
            Err(_) => panic!("revision table is full: more than {} live tags", u32::MAX),
        };
        Tag { index, generation }
    }

    fn state(&self, tag: Tag) -> Option<&TagState> {
        self.slots
            .get(tag.index as usize)
            .filter(|slot| slot.generation == tag.generation)
            .map(|slot| &slot.state)
    }

    /// Current revision of `tag`, or `None` if the tag was freed.
    ///
    /// Combined tags are evaluated fresh.
    pub fn revision(&self, tag: Tag) -> Option<Revision> {
        match self.state(tag)? {
            TagState::Dirtyable(revision) => Some(*revision),
            // Members of a live combined tag are live.
            TagState::Combined(members) => Some(
                members
                    .iter()
                    .filter_map(|member| self.revision(*member))
                    .max()
                    .unwrap_or(CONSTANT),
            ),
            TagState::Constant => Some(CONSTANT),
        }
    }

    /// Bump a dirtyable tag to the next clock value.
    ///
    /// Returns the new revision, or `None` for constant, combined and freed
    /// tags, which cannot be dirtied.
    pub fn bump(&mut self, tag: Tag, clock: &Clock) -> Option<Revision> {
        let slot = self
            .slots
            .get_mut(tag.index as usize)
            .filter(|slot| slot.generation == tag.generation)?;
        match &mut slot.state {
            TagState::Dirtyable(revision) => {
                *revision = clock.advance();
                Some(*revision)
            }
            _ => None,
        }
    }

    /// Returns true if `tag` can be bumped.
    pub fn is_dirtyable(&self, tag: Tag) -> bool {
        matches!(self.state(tag), Some(TagState::Dirtyable(_)))
    }

    /// Combine tags into one tag that changes whenever any of them changes.
    ///
    /// Freed inputs are skipped: they can never be bumped again.
    pub fn combine(&mut self, tags: impl IntoIterator<Item = Tag>) -> Tag {
        let mut inputs: Vec<Tag> = tags.into_iter().filter(|tag| !tag.is_constant()).collect();
        inputs.sort_unstable();
        inputs.dedup();

        if let [single] = inputs[..] {
            if self.state(single).is_some() {
                return single;
            }
        }

        let mut members = Vec::with_capacity(inputs.len());
        for tag in inputs {
            match self.state(tag) {
                Some(TagState::Combined(inner)) => members.extend_from_slice(inner),
                Some(TagState::Dirtyable(_)) => members.push(tag),
                Some(TagState::Constant) | None => {}
            }
        }
        members.sort_unstable();
        members.dedup();

        match members.len() {
            0 => Tag::CONSTANT,
            1 => members[0],
            _ => {
                let members = members.into_boxed_slice();
                if let Some(existing) = self.combined.get(&members) {
                    return *existing;
                }
                let tag = self.push(TagState::Combined(members.clone()));
                for member in members.iter() {
                    self.dependents.entry(*member).or_default().push(tag);
                }
                self.combined.insert(members, tag);
                tag
            }
        }
    }

    /// Free a dirtyable tag and every combined tag it is a member of.
    ///
    /// Handles to freed tags stay safe to use: they report no revision and
    /// cannot be bumped. Constant and combined tags are left alone.
    pub fn free(&mut self, tag: Tag) {
        if !self.is_dirtyable(tag) {
            return;
        }
        self.slots.remove(tag.index as usize);
        for composite in self.dependents.remove(&tag).unwrap_or_default() {
            self.free_combined(composite, tag);
        }
    }

    fn free_combined(&mut self, composite: Tag, freed_member: Tag) {
        let members = match self.state(composite) {
            Some(TagState::Combined(members)) => members.clone(),
            _ => return,
        };
        self.slots.remove(composite.index as usize);
        self.combined.remove(&members);
        for member in members.iter().filter(|member| **member != freed_member) {
            if let Some(dependents) = self.dependents.get_mut(member) {
                dependents.retain(|dependent| *dependent != composite);
                if dependents.is_empty() {
                    self.dependents.remove(member);
                }
            }
        }
    }

    /// Number of live tags, including the constant tag.
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
