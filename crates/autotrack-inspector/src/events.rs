//! Event types for autotrack tracing.
//!
//! This module defines all events that can be emitted by an autotrack
//! runtime: tracking frames, consumed tags, field writes and object releases.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use autotrack::{ObjectId, Revision, SpanId, Tag};

use autotrack::TracerObjectKey;

/// Represents an object in a serializable manner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    /// The label the object was created with (e.g., "Person")
    pub label: String,
    /// Arena identity of the object
    pub id: ObjectId,
}

impl ObjectKey {
    /// Create a new object key.
    pub fn new(label: impl Into<String>, id: ObjectId) -> Self {
        Self {
            label: label.into(),
            id,
        }
    }
}

impl From<&TracerObjectKey> for ObjectKey {
    fn from(key: &TracerObjectKey) -> Self {
        Self {
            label: key.label.to_string(),
            id: key.id,
        }
    }
}

impl From<&autotrack::TrackedObject> for ObjectKey {
    fn from(object: &autotrack::TrackedObject) -> Self {
        Self::new(object.label(), object.id())
    }
}

/// Events emitted by an autotrack runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackEvent {
    // === Tracking Frames ===
    /// A tracker became current.
    TrackingStart { span_id: SpanId },

    /// A tag was recorded on a tracker for the first time.
    TagConsumed { span_id: SpanId, tag: Tag },

    /// A tracker was retired.
    TrackingEnd {
        span_id: SpanId,
        /// Number of distinct tags the tracker observed.
        dependencies: usize,
        /// Time between start and end of the frame.
        duration: Duration,
    },

    // === Storage ===
    /// A field's initializer ran and its result was stored.
    FieldInitialized { object: ObjectKey, field: String },

    /// A tracked field was written.
    FieldDirtied {
        object: ObjectKey,
        field: String,
        /// The field tag's new revision.
        revision: Revision,
    },

    /// An object's storage was reclaimed.
    ObjectReleased { object: ObjectKey },

    // === Diagnostics ===
    /// An untracked member was written after a tracked computation read it.
    UntrackedMutation { object: ObjectKey, field: String },
}

/// A sequence of collected events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub events: Vec<TrackEvent>,
}

/// Event kind for comparison (without span ids, durations or revisions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    TrackingStart,
    TagConsumed { tag: Tag },
    TrackingEnd { dependencies: usize },
    FieldInitialized { object: ObjectKey, field: String },
    FieldDirtied { object: ObjectKey, field: String },
    ObjectReleased { object: ObjectKey },
    UntrackedMutation { object: ObjectKey, field: String },
}

impl From<&TrackEvent> for EventKind {
    fn from(event: &TrackEvent) -> Self {
        match event {
            TrackEvent::TrackingStart { .. } => EventKind::TrackingStart,
            TrackEvent::TagConsumed { tag, .. } => EventKind::TagConsumed { tag: *tag },
            TrackEvent::TrackingEnd { dependencies, .. } => EventKind::TrackingEnd {
                dependencies: *dependencies,
            },
            TrackEvent::FieldInitialized { object, field } => EventKind::FieldInitialized {
                object: object.clone(),
                field: field.clone(),
            },
            TrackEvent::FieldDirtied { object, field, .. } => EventKind::FieldDirtied {
                object: object.clone(),
                field: field.clone(),
            },
            TrackEvent::ObjectReleased { object } => EventKind::ObjectReleased {
                object: object.clone(),
            },
            TrackEvent::UntrackedMutation { object, field } => EventKind::UntrackedMutation {
                object: object.clone(),
                field: field.clone(),
            },
        }
    }
}

/// Convert a trace to a list of event kinds for comparison.
pub fn to_kinds(trace: &ExecutionTrace) -> Vec<EventKind> {
    trace.events.iter().map(EventKind::from).collect()
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: TrackEvent) {
        self.events.push(event);
    }

    /// Filter events for a specific object.
    pub fn events_for_object(&self, object: &ObjectKey) -> Vec<&TrackEvent> {
        self.events
            .iter()
            .filter(|e| event_object(e) == Some(object))
            .collect()
    }

    /// Tags consumed by the frame `span_id`, in recording order.
    pub fn consumed_tags(&self, span_id: SpanId) -> Vec<Tag> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TrackEvent::TagConsumed { span_id: s, tag } if *s == span_id => Some(*tag),
                _ => None,
            })
            .collect()
    }

    /// Get all tracking end events.
    pub fn tracking_ends(&self) -> impl Iterator<Item = (&SpanId, &usize, &Duration)> {
        self.events.iter().filter_map(|e| match e {
            TrackEvent::TrackingEnd {
                span_id,
                dependencies,
                duration,
            } => Some((span_id, dependencies, duration)),
            _ => None,
        })
    }

    /// Check if any event matches a predicate.
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&TrackEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }
}

fn event_object(event: &TrackEvent) -> Option<&ObjectKey> {
    match event {
        TrackEvent::FieldInitialized { object, .. }
        | TrackEvent::FieldDirtied { object, .. }
        | TrackEvent::ObjectReleased { object }
        | TrackEvent::UntrackedMutation { object, .. } => Some(object),
        TrackEvent::TrackingStart { .. }
        | TrackEvent::TagConsumed { .. }
        | TrackEvent::TrackingEnd { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotrack::Runtime;

    #[test]
    fn test_execution_trace() {
        let runtime = Runtime::new();
        let person = runtime.create_object("Person");
        let other = runtime.create_object("Person");
        let key = ObjectKey::from(&person);

        let mut trace = ExecutionTrace::new();
        trace.push(TrackEvent::TrackingStart { span_id: SpanId(1) });
        trace.push(TrackEvent::FieldInitialized {
            object: key.clone(),
            field: "name".to_string(),
        });
        trace.push(TrackEvent::ObjectReleased {
            object: ObjectKey::from(&other),
        });
        trace.push(TrackEvent::FieldDirtied {
            object: key.clone(),
            field: "name".to_string(),
            revision: 2,
        });

        assert_eq!(trace.events.len(), 4);
        assert_eq!(trace.events_for_object(&key).len(), 2);
        assert!(trace.has_event(|e| matches!(e, TrackEvent::ObjectReleased { .. })));
    }

    #[test]
    fn test_consumed_tags_by_span() {
        let runtime = Runtime::new();
        let a = runtime.create_tag();
        let b = runtime.create_tag();

        let trace = ExecutionTrace {
            events: vec![
                TrackEvent::TagConsumed { span_id: SpanId(1), tag: a },
                TrackEvent::TagConsumed { span_id: SpanId(2), tag: b },
                TrackEvent::TagConsumed { span_id: SpanId(1), tag: b },
            ],
        };
        assert_eq!(trace.consumed_tags(SpanId(1)), vec![a, b]);
        assert_eq!(trace.consumed_tags(SpanId(2)), vec![b]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let runtime = Runtime::new();
        let object = runtime.create_object("Point");
        let event = TrackEvent::FieldDirtied {
            object: ObjectKey::from(&object),
            field: "x".to_string(),
            revision: 7,
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: TrackEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }
}
