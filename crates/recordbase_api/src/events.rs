//! Broadcast sink feeding the `/api/events` SSE stream.

use recordbase_core::{NotificationSink, RecordEvent, SinkError};
use tokio::sync::broadcast;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notification sink that fans record events out to SSE subscribers.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<RecordEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl NotificationSink for EventBroadcaster {
    fn sink_id(&self) -> &str {
        "sse"
    }

    /// Having no subscribers is not a delivery failure.
    fn publish(&self, event: &RecordEvent) -> Result<(), SinkError> {
        if self.tx.receiver_count() == 0 {
            return Ok(());
        }
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|err| SinkError(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::EventBroadcaster;
    use recordbase_core::{NotificationSink, RecordEvent, RecordEventType};

    #[test]
    fn publish_without_subscribers_is_ok() {
        let broadcaster = EventBroadcaster::new(4);
        let event = RecordEvent::now(RecordEventType::Created, "tickets", 1);
        assert!(broadcaster.publish(&event).is_ok());
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let broadcaster = EventBroadcaster::new(4);
        let mut rx = broadcaster.subscribe();
        let event = RecordEvent::now(RecordEventType::Updated, "tickets", 5);
        broadcaster.publish(&event).unwrap();
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
