use serde::Serialize;
use tokio::sync::broadcast;

/// A whitelist-sync or command-queue event for operator dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct SyncEvent {
    /// Event type, e.g. "sync.started", "sync.failed", "command.dropped"
    #[serde(rename = "type")]
    pub event_type: String,
    pub site_id: i32,
    pub device_id: i32,
    /// Failure reason, dropped command type, or other detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl SyncEvent {
    /// Create an event timestamped to now.
    pub fn now(
        event_type: impl Into<String>,
        site_id: i32,
        device_id: i32,
        detail: Option<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            site_id,
            device_id,
            detail,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Broadcast-based event bus.
///
/// Subscribers receive events via `tokio::sync::broadcast`. If a subscriber
/// falls behind, it receives `RecvError::Lagged` and should re-read sync status.
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. If there are no subscribers the event is dropped silently.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn emit(&self, event_type: &str, site_id: i32, device_id: i32, detail: Option<String>) {
        self.publish(SyncEvent::now(event_type, site_id, device_id, detail));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
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
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit("sync.started", 1, 42, None);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "sync.started");
        assert_eq!(event.device_id, 42);
    }

    #[tokio::test]
    async fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit("sync.completed", 1, 1, None);
    }

    #[tokio::test]
    async fn lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.emit("sync.batch_queued", 1, i, None);
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            other => panic!("Expected Lagged, got {:?}", other),
        }
    }

    #[test]
    fn event_serializes_type_field() {
        let event = SyncEvent {
            event_type: "sync.failed".into(),
            site_id: 3,
            device_id: 9,
            detail: Some("Sync timed out".into()),
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"sync.failed""#));
        assert!(json.contains(r#""detail":"Sync timed out""#));
        assert!(!json.contains("event_type"));
    }
}
