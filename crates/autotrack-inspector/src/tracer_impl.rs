//! EventSinkTracer - Bridge between the autotrack Tracer and EventSink.
//!
//! This module provides `EventSinkTracer`, which implements the `Tracer` trait
//! from autotrack and forwards events to an `EventSink` as `TrackEvent` instances.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use autotrack::{FieldKey, Revision, SpanId, Tag, Tracer, TracerObjectKey};
use parking_lot::Mutex;

use crate::events::TrackEvent;
use crate::sink::EventSink;

/// Global span ID counter for EventSinkTracer.
static SPAN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A `Tracer` implementation that forwards events to an `EventSink`.
///
/// One tracer may serve several threads. Open frames are tracked per
/// thread, and the sink is flushed when the outermost frame of a thread ends,
/// whatever other threads still have open.
///
/// # Example
///
/// ```ignore
/// use autotrack::Runtime;
/// use autotrack_inspector::{EventCollector, EventSinkTracer};
/// use std::sync::Arc;
///
/// let collector = Arc::new(EventCollector::new());
/// let tracer = EventSinkTracer::new(collector.clone());
/// let runtime = Runtime::with_tracer(tracer);
///
/// // Track computations, write fields...
///
/// // Get the trace
/// let trace = collector.trace();
/// ```
pub struct EventSinkTracer {
    sink: Arc<dyn EventSink>,
    open: Mutex<HashMap<SpanId, OpenFrame>>,
}

struct OpenFrame {
    thread: ThreadId,
    started: Instant,
}

impl EventSinkTracer {
    /// Create a new EventSinkTracer wrapping the given sink.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Frames started on the calling thread and not yet ended.
    pub fn open_frames(&self) -> usize {
        let current = thread::current().id();
        self.open
            .lock()
            .values()
            .filter(|frame| frame.thread == current)
            .count()
    }
}

impl Tracer for EventSinkTracer {
    #[inline]
    fn new_span_id(&self) -> SpanId {
        SpanId(SPAN_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    fn on_tracking_start(&self, span_id: SpanId) {
        self.open.lock().insert(
            span_id,
            OpenFrame {
                thread: thread::current().id(),
                started: Instant::now(),
            },
        );
        self.sink.emit(TrackEvent::TrackingStart { span_id });
    }

    #[inline]
    fn on_tracking_end(&self, span_id: SpanId, dependencies: usize) {
        let (duration, outermost) = {
            let mut open = self.open.lock();
            match open.remove(&span_id) {
                Some(frame) => {
                    let thread = frame.thread;
                    let nested = open.values().any(|other| other.thread == thread);
                    (frame.started.elapsed(), !nested)
                }
                None => (Duration::ZERO, false),
            }
        };
        self.sink.emit(TrackEvent::TrackingEnd {
            span_id,
            dependencies,
            duration,
        });
        if outermost {
            self.sink.flush();
        }
    }

    #[inline]
    fn on_tag_consumed(&self, span_id: SpanId, tag: Tag) {
        self.sink.emit(TrackEvent::TagConsumed { span_id, tag });
    }

    #[inline]
    fn on_field_initialized(&self, object: &TracerObjectKey, key: &FieldKey) {
        self.sink.emit(TrackEvent::FieldInitialized {
            object: object.into(),
            field: key.to_string(),
        });
    }

    #[inline]
    fn on_field_dirtied(&self, object: &TracerObjectKey, key: &FieldKey, revision: Revision) {
        self.sink.emit(TrackEvent::FieldDirtied {
            object: object.into(),
            field: key.to_string(),
            revision,
        });
    }

    #[inline]
    fn on_object_released(&self, object: &TracerObjectKey) {
        self.sink.emit(TrackEvent::ObjectReleased {
            object: object.into(),
        });
    }

    #[inline]
    fn on_untracked_mutation(&self, object: &TracerObjectKey, key: &FieldKey) {
        self.sink.emit(TrackEvent::UntrackedMutation {
            object: object.into(),
            field: key.to_string(),
        });
    }
}
