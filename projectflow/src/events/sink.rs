//! Event sink trait and implementations.

use crate::core::{EventKind, PipelineEvent};
use parking_lot::RwLock;
use std::fmt::Debug;
use tracing::{debug, info, warn, Level};

/// Synchronous observer attached to an [`EventChannel`](super::EventChannel).
///
/// Sinks are called inline by `publish`, so they must not block.
pub trait EventSink: Send + Sync + Debug {
    /// Receives an event. Must never panic.
    fn try_emit(&self, event: &PipelineEvent);
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    /// The log level to use.
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn try_emit(&self, event: &PipelineEvent) {
        let run_id = event.run_id();
        let stage = event.stage().unwrap_or("");
        match event {
            PipelineEvent::StageError { error, .. } | PipelineEvent::RunError { error, .. } => {
                warn!(event_type = %event.kind(), run_id, stage, error = %error, "Pipeline failure event");
            }
            PipelineEvent::StageCompleted {
                duration_ms,
                artifact_count,
                skipped,
                ..
            } if self.level != Level::DEBUG => {
                info!(run_id, stage, duration_ms, artifact_count, skipped, "Stage completed");
            }
            // Progress and log lines are chatty; keep them at debug.
            PipelineEvent::Progress { .. } | PipelineEvent::Log { .. } => {
                debug!(event_type = %event.kind(), run_id, stage, "Event: {}", event.kind());
            }
            _ if self.level == Level::DEBUG => {
                debug!(event_type = %event.kind(), run_id, stage, "Event: {}", event.kind());
            }
            _ => {
                info!(event_type = %event.kind(), run_id, stage, "Event: {}", event.kind());
            }
        }
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events of one kind.
    #[must_use]
    pub fn events_of_kind(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Returns events of one run.
    #[must_use]
    pub fn events_for_run(&self, run_id: &str) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.run_id() == run_id)
            .cloned()
            .collect()
    }

    /// Returns the kinds of all collected events, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.read().iter().map(PipelineEvent::kind).collect()
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_sink() {
        let sink = LoggingEventSink::default();
        sink.try_emit(&PipelineEvent::run_started("r"));
        sink.try_emit(&PipelineEvent::stage_completed("r", "Backend", 12, 0, true));
        sink.try_emit(&PipelineEvent::run_error("r", Some("Frontend"), "boom"));
        LoggingEventSink::debug().try_emit(&PipelineEvent::progress("r", "Frontend", 50));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.try_emit(&PipelineEvent::run_started("r1"));
        sink.try_emit(&PipelineEvent::stage_started("r1", "Requirement"));
        sink.try_emit(&PipelineEvent::run_started("r2"));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_kind(EventKind::RunStarted).len(), 2);
        assert_eq!(sink.events_for_run("r1").len(), 2);
        assert_eq!(
            sink.kinds(),
            vec![EventKind::RunStarted, EventKind::StageStarted, EventKind::RunStarted]
        );
    }

    #[test]
    fn test_collecting_sink_clear() {
        let sink = CollectingEventSink::new();
        sink.try_emit(&PipelineEvent::run_paused("r"));
        assert_eq!(sink.len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
