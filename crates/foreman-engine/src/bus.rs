//! In-process event bus for engine activity.
//!
//! A broadcast channel owned by the engine and handed to dependents
//! explicitly; no global emitter. Publishing is fire-and-forget per
//! subscriber: a send with no receivers (or a lagging receiver) never
//! blocks or fails the publisher. Dropping a receiver is the unsubscribe.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt as _};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    RunCompleted,
    ActionProposed,
    ActionApproved,
    ActionRejected,
    ActionExecuted,
    ActionFailed,
    ConfigUpdated,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, kind: EventKind, data: serde_json::Value) {
        let event = EngineEvent {
            kind,
            timestamp: Utc::now(),
            data,
        };
        // No subscribers is fine; the event is simply dropped.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Stream adapter for SSE-style consumers. Lagged receivers skip the
    /// missed events rather than terminating the stream.
    pub fn stream(&self) -> impl Stream<Item = EngineEvent> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|msg| match msg {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn every_subscriber_sees_the_same_sequence() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(EventKind::RunStarted, json!({"run": 1}));
        bus.publish(EventKind::RunCompleted, json!({"run": 1}));

        for rx in [&mut first, &mut second] {
            let a = rx.recv().await.unwrap();
            let b = rx.recv().await.unwrap();
            assert_eq!(a.kind, EventKind::RunStarted);
            assert_eq!(b.kind, EventKind::RunCompleted);
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(EventKind::ConfigUpdated, json!({}));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropped_receiver_unsubscribes() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn stream_yields_published_events() {
        let bus = EventBus::new();
        let mut stream = Box::pin(bus.stream());
        bus.publish(EventKind::ActionProposed, json!({"id": "x"}));
        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, EventKind::ActionProposed);
        assert_eq!(event.data["id"], "x");
    }

    #[test]
    fn event_wire_format_uses_type_tag() {
        let event = EngineEvent {
            kind: EventKind::ActionExecuted,
            timestamp: Utc::now(),
            data: json!({"id": 7}),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "action_executed");
        assert_eq!(v["data"]["id"], 7);
    }
}
