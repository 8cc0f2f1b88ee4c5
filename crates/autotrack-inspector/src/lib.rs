//! Autotrack Inspector: tracing and observability for autotrack.
//!
//! This crate turns the callbacks of an autotrack [`Tracer`](autotrack::Tracer)
//! into serializable [`TrackEvent`]s and routes them to an [`EventSink`]:
//!
//! - **EventCollector**: Records events and flushes for test assertions
//! - **FrameSink**: Groups consumed tags into one [`Frame`] per tracking frame
//!
//! # Quick Start
//!
//! ```ignore
//! use autotrack::{Runtime, TrackedField};
//! use autotrack_inspector::{to_kinds, EventCollector, EventKind, EventSinkTracer};
//! use std::sync::Arc;
//!
//! let collector = Arc::new(EventCollector::new());
//! let runtime = Runtime::with_tracer(EventSinkTracer::new(collector.clone()));
//!
//! let x = TrackedField::<i32>::new("x")?;
//! let point = runtime.create_object("Point");
//! x.set(&runtime, &point, 1);
//!
//! assert!(matches!(
//!     to_kinds(&collector.trace())[..],
//!     [EventKind::FieldDirtied { .. }]
//! ));
//! ```
//!
//! # Event Types
//!
//! - **Tracking Frames**: `TrackingStart`, `TagConsumed`, `TrackingEnd`
//! - **Storage**: `FieldInitialized`, `FieldDirtied`, `ObjectReleased`
//! - **Diagnostics**: `UntrackedMutation`
//!
//! See [`TrackEvent`] for the complete list.

mod collector;
mod events;
mod sink;
mod tracer_impl;

pub use collector::EventCollector;
pub use events::{
    to_kinds, EventKind, ExecutionTrace, ObjectId, ObjectKey, Revision, SpanId, Tag, TrackEvent,
};
pub use sink::{EventSink, Frame, FrameSink};
pub use tracer_impl::EventSinkTracer;
