//! In-process notification sink registry.

use crate::notify::{NotificationSink, RecordEvent};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationHubError {
    InvalidSinkId(String),
    DuplicateSinkId(String),
    SinkNotFound(String),
}

impl Display for NotificationHubError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSinkId(value) => write!(f, "sink id is invalid: {value}"),
            Self::DuplicateSinkId(value) => write!(f, "sink id already registered: {value}"),
            Self::SinkNotFound(value) => write!(f, "sink not found: {value}"),
        }
    }
}

impl Error for NotificationHubError {}

/// Fans record events out to every registered sink.
#[derive(Default)]
pub struct NotificationHub {
    sinks: BTreeMap<String, Arc<dyn NotificationSink>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Arc<dyn NotificationSink>) -> Result<(), NotificationHubError> {
        let sink_id = sink.sink_id().trim().to_string();
        if !is_valid_sink_id(&sink_id) {
            return Err(NotificationHubError::InvalidSinkId(sink_id));
        }
        if self.sinks.contains_key(sink_id.as_str()) {
            return Err(NotificationHubError::DuplicateSinkId(sink_id));
        }
        self.sinks.insert(sink_id, sink);
        Ok(())
    }

    pub fn unregister(&mut self, sink_id: &str) -> Result<(), NotificationHubError> {
        self.sinks
            .remove(sink_id.trim())
            .map(|_| ())
            .ok_or_else(|| NotificationHubError::SinkNotFound(sink_id.trim().to_string()))
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Sorted sink ids.
    pub fn sink_ids(&self) -> Vec<String> {
        self.sinks.keys().cloned().collect()
    }

    /// Delivers `event` to every sink.
    ///
    /// Failures are logged and returned as `"<sink id>: <message>"` notes;
    /// they never stop delivery to the remaining sinks.
    pub fn publish(&self, event: &RecordEvent) -> Vec<String> {
        let mut failures = Vec::new();
        for (sink_id, sink) in &self.sinks {
            if let Err(err) = sink.publish(event) {
                log::warn!(
                    "event=notify_publish module=notify status=error sink={} type={} record_id={} error={}",
                    sink_id,
                    event.event_type.as_str(),
                    event.record_id,
                    err
                );
                failures.push(format!("{sink_id}: {err}"));
            }
        }
        log::debug!(
            "event=notify_publish module=notify status=ok type={} record_id={} sinks={} failed={}",
            event.event_type.as_str(),
            event.record_id,
            self.sinks.len(),
            failures.len()
        );
        failures
    }
}

fn is_valid_sink_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::{NotificationHub, NotificationHubError};
    use crate::notify::{NotificationSink, RecordEvent, RecordEventType, SinkError};
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        id: String,
        seen: Mutex<Vec<RecordEvent>>,
    }

    impl RecordingSink {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl NotificationSink for RecordingSink {
        fn sink_id(&self) -> &str {
            &self.id
        }

        fn publish(&self, event: &RecordEvent) -> Result<(), SinkError> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn sink_id(&self) -> &str {
            "broken"
        }

        fn publish(&self, _event: &RecordEvent) -> Result<(), SinkError> {
            Err(SinkError("socket closed".to_string()))
        }
    }

    #[test]
    fn rejects_invalid_or_duplicate_sink_ids() {
        let mut hub = NotificationHub::new();
        assert!(matches!(
            hub.register(Arc::new(RecordingSink::new("Web Socket"))),
            Err(NotificationHubError::InvalidSinkId(_))
        ));
        hub.register(Arc::new(RecordingSink::new("sse"))).unwrap();
        assert!(matches!(
            hub.register(Arc::new(RecordingSink::new("sse"))),
            Err(NotificationHubError::DuplicateSinkId(_))
        ));
        assert_eq!(hub.sink_ids(), vec!["sse".to_string()]);
    }

    #[test]
    fn failing_sink_does_not_block_others() {
        let mut hub = NotificationHub::new();
        let good = Arc::new(RecordingSink::new("sse"));
        hub.register(good.clone()).unwrap();
        hub.register(Arc::new(FailingSink)).unwrap();

        let failures = hub.publish(&RecordEvent::now(RecordEventType::Created, "tickets", 3));
        assert_eq!(failures, vec!["broken: socket closed".to_string()]);
        assert_eq!(good.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn unregister_removes_sink() {
        let mut hub = NotificationHub::new();
        hub.register(Arc::new(RecordingSink::new("sse"))).unwrap();
        hub.unregister(" sse ").unwrap();
        assert!(hub.is_empty());
        assert!(matches!(
            hub.unregister("sse"),
            Err(NotificationHubError::SinkNotFound(_))
        ));
    }
}
