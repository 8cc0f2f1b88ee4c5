//! Revision numbers and the runtime-wide revision clock.
//!
//! Every dirtyable tag stores the clock value observed when it was last
//! bumped. Because the clock is shared by all tags of a runtime, revisions of
//! different tags are comparable, which is what lets a combined tag report the
//! maximum of its members.

use std::sync::atomic::{AtomicU64, Ordering};

/// Revision counter type - monotonically increasing counter for tracking changes.
pub type Revision = u64;

/// Revision of the constant tag. It never advances.
pub const CONSTANT: Revision = 0;

/// Base revision of a freshly created tag and starting value of the clock.
pub const INITIAL: Revision = 1;

/// Runtime-wide revision clock.
///
/// Only advanced while the runtime state lock is held, so a tag bump and the
/// clock step are observed together. Reading is lock-free.
pub(crate) struct Clock {
    current: AtomicU64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(INITIAL),
        }
    }

    /// Current clock value.
    #[inline]
    pub fn now(&self) -> Revision {
        self.current.load(Ordering::Acquire)
    }

    /// Step the clock and return the new value.
    #[inline]
    pub fn advance(&self) -> Revision {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }
}
