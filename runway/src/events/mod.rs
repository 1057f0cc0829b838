//! Event sink for run observability.
//!
//! The executor emits a small fixed vocabulary of events: `run.started`,
//! `stage.started`, `stage.completed`, `stage.failed`, `command.completed`,
//! `post.started`, `post.completed`, and `run.completed`.

use async_trait::async_trait;
use tracing::info;

/// Trait for sinks receiving executor events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);

    /// Emits an event without blocking. Must never fail or panic.
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// A no-op sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// A sink that forwards events to the tracing framework at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl LoggingEventSink {
    /// Creates a new logging sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn log_event(event_type: &str, data: &Option<serde_json::Value>) {
        info!(
            event_type = %event_type,
            event_data = ?data,
            "Event: {}", event_type
        );
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        Self::log_event(event_type, &data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        Self::log_event(event_type, &data);
    }
}

/// A collecting sink for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(String, Option<serde_json::Value>)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<serde_json::Value>)> {
        self.events.read().clone()
    }

    /// Returns the event types collected so far, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Counts events of a given type.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .count()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink_discards() {
        let sink = NoOpEventSink;
        sink.emit("run.started", None).await;
        sink.try_emit("run.completed", Some(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_collecting_sink_records_in_order() {
        let sink = CollectingEventSink::new();
        sink.emit("run.started", None).await;
        sink.try_emit("stage.started", Some(serde_json::json!({"stage": "build"})));
        sink.emit("stage.started", None).await;

        assert_eq!(
            sink.event_types(),
            vec!["run.started", "stage.started", "stage.started"]
        );
        assert_eq!(sink.count("stage.started"), 2);
        assert_eq!(sink.count("run.completed"), 0);
    }
}
