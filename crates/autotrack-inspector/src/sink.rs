//! Destinations for [`TrackEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::events::{SpanId, Tag, TrackEvent};

/// Receives the events an [`EventSinkTracer`](crate::EventSinkTracer)
/// produces.
///
/// `emit` may be called from several threads at once.
pub trait EventSink: Send + Sync + 'static {
    /// Receive one event.
    fn emit(&self, event: TrackEvent);

    /// The outermost tracking frame of some thread has ended.
    ///
    /// Sinks that buffer can hand their buffer on here.
    fn flush(&self) {}
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: TrackEvent) {
        (**self).emit(event);
    }

    fn flush(&self) {
        (**self).flush();
    }
}

/// What one tracking frame depended on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub span_id: SpanId,
    /// Consumed tags, in first-read order.
    pub tags: Vec<Tag>,
    pub duration: Duration,
}

/// Groups consumed tags by tracking frame.
///
/// Each frame is handed to the callback when it ends, inner frames before the
/// frames enclosing them. Events other than frame events are ignored.
///
/// # Example
///
/// ```ignore
/// let sink = FrameSink::new(|frame| println!("{:?} read {} tags", frame.span_id, frame.tags.len()));
/// let runtime = Runtime::with_tracer(EventSinkTracer::new(Arc::new(sink)));
/// ```
pub struct FrameSink<F> {
    open: Mutex<HashMap<SpanId, Vec<Tag>>>,
    on_frame: F,
}

impl<F> FrameSink<F>
where
    F: Fn(Frame) + Send + Sync + 'static,
{
    pub fn new(on_frame: F) -> Self {
        Self {
            open: Mutex::new(HashMap::new()),
            on_frame,
        }
    }

    /// Number of frames started but not yet ended.
    pub fn open_frames(&self) -> usize {
        self.open.lock().len()
    }
}

impl<F> EventSink for FrameSink<F>
where
    F: Fn(Frame) + Send + Sync + 'static,
{
    fn emit(&self, event: TrackEvent) {
        let finished = {
            let mut open = self.open.lock();
            match event {
                TrackEvent::TrackingStart { span_id } => {
                    open.insert(span_id, Vec::new());
                    None
                }
                TrackEvent::TagConsumed { span_id, tag } => {
                    if let Some(tags) = open.get_mut(&span_id) {
                        tags.push(tag);
                    }
                    None
                }
                TrackEvent::TrackingEnd {
                    span_id, duration, ..
                } => open.remove(&span_id).map(|tags| Frame {
                    span_id,
                    tags,
                    duration,
                }),
                _ => None,
            }
        };
        // The callback may take its own locks.
        if let Some(frame) = finished {
            (self.on_frame)(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotrack::Runtime;

    fn end(span_id: SpanId, dependencies: usize) -> TrackEvent {
        TrackEvent::TrackingEnd {
            span_id,
            dependencies,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_frames_follow_nesting() {
        let runtime = Runtime::new();
        let (a, b) = (runtime.create_tag(), runtime.create_tag());
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let frames = frames.clone();
            FrameSink::new(move |frame| frames.lock().push(frame))
        };

        sink.emit(TrackEvent::TrackingStart { span_id: SpanId(1) });
        sink.emit(TrackEvent::TagConsumed { span_id: SpanId(1), tag: a });
        sink.emit(TrackEvent::TrackingStart { span_id: SpanId(2) });
        sink.emit(TrackEvent::TagConsumed { span_id: SpanId(2), tag: b });
        assert_eq!(sink.open_frames(), 2);
        sink.emit(end(SpanId(2), 1));
        sink.emit(TrackEvent::TagConsumed { span_id: SpanId(1), tag: b });
        sink.emit(end(SpanId(1), 2));

        let frames = frames.lock();
        assert_eq!(sink.open_frames(), 0);
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[0].span_id, frames[0].tags.clone()), (SpanId(2), vec![b]));
        assert_eq!((frames[1].span_id, frames[1].tags.clone()), (SpanId(1), vec![a, b]));
    }

    #[test]
    fn test_unknown_frames_are_ignored() {
        let sink = FrameSink::new(|_| panic!("no frame was started"));
        sink.emit(TrackEvent::TagConsumed {
            span_id: SpanId(9),
            tag: Tag::CONSTANT,
        });
        sink.emit(end(SpanId(9), 0));
        assert_eq!(sink.open_frames(), 0);
    }

    #[test]
    fn test_arc_forwards() {
        let frames = Arc::new(Mutex::new(0));
        let sink: Arc<dyn EventSink> = {
            let frames = frames.clone();
            Arc::new(FrameSink::new(move |_| *frames.lock() += 1))
        };
        let shared = Arc::new(sink);
        shared.emit(TrackEvent::TrackingStart { span_id: SpanId(1) });
        shared.emit(end(SpanId(1), 0));
        shared.flush();
        assert_eq!(*frames.lock(), 1);
    }
}
