//! Event Hub (component §4.G): single-writer multi-subscriber in-process
//! broker, modelled on
//! `examples/Lowband21-ferrex/ferrex-core/src/scan/orchestration/runtime/event_bus.rs`.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{OperationId, OperationStatus};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    OperationProgress { operation_id: OperationId, done: u64, total: u64, message: String },
    OperationLog { operation_id: OperationId, level: String, message: String },
    OperationCompleted { operation_id: OperationId, status: OperationStatus, message: String },
    LibraryChanged { book_id: String },
    ImportDiscovered { import_path_id: u64, file_path: String },
    ConfigChanged { key: String },
    Heartbeat,
}

/// Broadcasts to every subscriber; a subscriber more than
/// [`broadcast::Receiver::recv`]-lagged behind the channel capacity observes
/// a `Lagged` error and is treated as dropped by its own SSE bridge rather
/// than by the hub itself (`tokio::sync::broadcast`'s built-in policy
/// matches §4.G "slow subscribers are dropped rather than blocking
/// producers").
pub struct EventHub {
    sender: broadcast::Sender<Event>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // No receivers is a legitimate steady state (no clients connected);
        // the send error there is not worth logging.
        let _ = self.sender.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();
        hub.publish(Event::Heartbeat);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::Heartbeat));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let hub = EventHub::new();
        hub.publish(Event::Heartbeat);
    }
}
