//! Autotrack: automatic dependency tracking for computed values.
//!
//! Computations discover what they depend on by reading tracked fields.
//! Each read records the field's revision [`Tag`] on the computation's
//! [`Tracker`]; the tracker collapses into one combined tag when the
//! computation ends. Writing a field bumps its tag, so a stale computation is
//! detected lazily by comparing revisions at its next read.
//!
//! # Key Features
//!
//! - **Implicit dependencies**: no declarations, only observed reads
//! - **Pull-based invalidation**: writes bump tags, recomputation happens on the next read
//! - **Two granularities**: depend on one field or on a whole object
//! - **Explicit execution context**: the current tracker lives in an [`ExecutionContext`], not a global
//! - **Observability**: plug in a [`Tracer`] to watch tracking, writes and releases
//!
//! # Example
//!
//! ```ignore
//! use autotrack::{Memo, Runtime, TrackedField};
//!
//! let runtime = Runtime::new();
//! let first = TrackedField::builder("first").initializer(|| "Ada".to_string()).build()?;
//! let person = runtime.create_object("Person");
//!
//! let cx = runtime.context();
//! let (greeting, tag) = cx.track(|cx| format!("Hello, {}", first.get(cx, &person)));
//! let snapshot = runtime.revision(tag);
//!
//! first.set(&runtime, &person, "Grace".to_string());
//! assert!(!runtime.validate(tag, snapshot));
//! ```
//!
//! # Change Notification
//!
//! Every tracked write calls the runtime's change notifier with no
//! arguments. A scheduler installs one with [`Runtime::set_change_notifier`]
//! and re-renders whatever it considers stale.

#![deny(missing_docs)]

mod class;
mod context;
mod diagnostics;
mod error;
mod field;
mod memo;
mod notify;
mod object;
mod registry;
pub mod revision;
mod runtime;
mod storage;
mod tag;
pub mod tracer;
mod tracker;

pub use class::{ClassDescriptor, MemberKind};
pub use context::{Access, ExecutionContext, TrackingScope};
pub use error::{ConfigError, UsageError};
pub use field::{FieldBuilder, TrackedField};
pub use memo::Memo;
pub use notify::ChangeNotifier;
pub use object::TrackedObject;
pub use revision::Revision;
pub use runtime::{Runtime, RuntimeBuilder};
pub use storage::{FieldKey, ObjectId};
pub use tag::Tag;
pub use tracer::{NoopTracer, SpanId, Tracer, TracerObjectKey};
pub use tracker::Tracker;
