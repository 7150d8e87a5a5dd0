use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events published to the UI layer. The transport is a broadcast channel;
/// whatever sits on the other end (Tauri, HTTP, a test subscriber) is not
/// this crate's concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    #[serde(rename = "notes:updated")]
    NotesUpdated { note_ids: Vec<i64> },
    #[serde(rename = "notes:deleted")]
    NotesDeleted { note_ids: Vec<i64> },
    #[serde(rename = "index:complete")]
    IndexComplete {
        notes_indexed: usize,
        duration_ms: u64,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<VaultEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishing with no subscribers is fine; the event is dropped.
    pub fn publish(&self, event: VaultEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(VaultEvent::NotesUpdated { note_ids: vec![1, 2] });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, VaultEvent::NotesUpdated { note_ids: vec![1, 2] });
    }

    #[test]
    fn test_event_wire_names() {
        let json = serde_json::to_value(VaultEvent::IndexComplete {
            notes_indexed: 42,
            duration_ms: 120,
        })
        .unwrap();
        assert_eq!(json["event"], "index:complete");
        assert_eq!(json["notes_indexed"], 42);

        let json = serde_json::to_value(VaultEvent::NotesDeleted { note_ids: vec![7] }).unwrap();
        assert_eq!(json["event"], "notes:deleted");
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(VaultEvent::NotesDeleted { note_ids: vec![] });
    }
}
