//! In-memory event recording for tests.

use parking_lot::Mutex;

use crate::events::{ExecutionTrace, TrackEvent};
use crate::sink::EventSink;

/// Records every event it receives.
///
/// Besides the raw events it remembers where each flush happened, so a test
/// can tell which events belong to completed outermost frames.
///
/// # Example
///
/// ```ignore
/// let collector = Arc::new(EventCollector::new());
/// let runtime = Runtime::with_tracer(EventSinkTracer::new(collector.clone()));
///
/// let cx = runtime.context();
/// cx.track(|cx| x.get(cx, &point));
///
/// assert_eq!(collector.flushes(), 1);
/// assert_eq!(collector.settled().events.len(), collector.trace().events.len());
/// ```
#[derive(Debug, Default)]
pub struct EventCollector {
    state: Mutex<Recorded>,
}

#[derive(Debug, Default)]
struct Recorded {
    events: Vec<TrackEvent>,
    /// Number of events received before the latest flush.
    settled: usize,
    flushes: usize,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn trace(&self) -> ExecutionTrace {
        ExecutionTrace {
            events: self.state.lock().events.clone(),
        }
    }

    /// Events recorded up to the latest flush.
    pub fn settled(&self) -> ExecutionTrace {
        let state = self.state.lock();
        ExecutionTrace {
            events: state.events[..state.settled].to_vec(),
        }
    }

    /// How many times the tracer flushed this collector.
    pub fn flushes(&self) -> usize {
        self.state.lock().flushes
    }

    /// Forget recorded events and flushes.
    pub fn clear(&self) {
        *self.state.lock() = Recorded::default();
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for EventCollector {
    fn emit(&self, event: TrackEvent) {
        self.state.lock().events.push(event);
    }

    fn flush(&self) {
        let mut state = self.state.lock();
        state.settled = state.events.len();
        state.flushes += 1;
    }
}
