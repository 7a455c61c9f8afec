//! Broadcast channel with per-run filtering.

use super::EventSink;
use crate::config::OrchestratorConfig;
use crate::core::PipelineEvent;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Events of one run.
    Run(String),
    /// Every event.
    All,
}

impl EventFilter {
    /// Returns true if `event` passes the filter.
    #[must_use]
    pub fn matches(&self, event: &PipelineEvent) -> bool {
        match self {
            Self::Run(run_id) => event.run_id() == run_id,
            Self::All => true,
        }
    }
}

/// The publish surface shared by the orchestrator and stages.
///
/// Cloning is cheap and every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventChannel {
    sender: broadcast::Sender<PipelineEvent>,
    sinks: Arc<[Arc<dyn EventSink>]>,
}

impl EventChannel {
    /// Creates a channel buffering `capacity` events per subscriber.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_sinks(capacity, Vec::new())
    }

    /// Creates a channel that also forwards every event to `sinks`.
    #[must_use]
    pub fn with_sinks(capacity: usize, sinks: Vec<Arc<dyn EventSink>>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sinks: sinks.into(),
        }
    }

    /// Creates a channel sized by `config.event_buffer`.
    #[must_use]
    pub fn from_config(config: &OrchestratorConfig, sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self::with_sinks(config.event_buffer, sinks)
    }

    /// Publishes an event. Never blocks and never fails.
    pub fn publish(&self, event: PipelineEvent) {
        for sink in self.sinks.iter() {
            sink.try_emit(&event);
        }
        if self.sender.send(event).is_err() {
            tracing::trace!("Event published with no subscribers");
        }
    }

    /// Attaches a new subscriber. Only events published afterwards are seen.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default(), Vec::new())
    }
}

/// A filtered receiver. Dropping it detaches the subscriber.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: broadcast::Receiver<PipelineEvent>,
    filter: EventFilter,
}

impl EventSubscription {
    /// Returns the filter.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Waits for the next matching event.
    ///
    /// Returns `None` once every sender is gone. Lagged events are skipped
    /// with a warning.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, filter = ?self.filter, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, filter = ?self.filter, "Event subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drains every buffered matching event.
    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Converts the subscription into a stream.
    pub fn into_stream(self) -> impl Stream<Item = PipelineEvent> + Send + Unpin {
        Box::pin(futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventKind;
    use crate::events::CollectingEventSink;
    use futures::StreamExt;

    #[test]
    fn test_publish_without_subscribers() {
        let channel = EventChannel::new(4);
        channel.publish(PipelineEvent::run_started("r"));
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_filter_by_run() {
        let channel = EventChannel::new(16);
        let mut only_a = channel.subscribe(EventFilter::Run("a".into()));
        let mut all = channel.subscribe(EventFilter::All);

        channel.publish(PipelineEvent::run_started("b"));
        channel.publish(PipelineEvent::run_started("a"));
        channel.publish(PipelineEvent::run_completed("a", &[]));

        assert_eq!(only_a.recv().await.unwrap().kind(), EventKind::RunStarted);
        assert_eq!(only_a.recv().await.unwrap().kind(), EventKind::RunCompleted);
        assert_eq!(all.drain().len(), 3);
        assert!(only_a.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_no_replay() {
        let channel = EventChannel::new(16);
        channel.publish(PipelineEvent::run_started("a"));

        let mut sub = channel.subscribe(EventFilter::All);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lag_is_skipped() {
        let channel = EventChannel::new(2);
        let mut sub = channel.subscribe(EventFilter::All);

        for i in 0..5u8 {
            channel.publish(PipelineEvent::progress("r", "Frontend", i));
        }

        let progress: Vec<u8> = sub
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Progress { progress, .. } => Some(progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_closed_channel_ends_subscription() {
        let channel = EventChannel::new(4);
        let mut sub = channel.subscribe(EventFilter::All);
        channel.publish(PipelineEvent::run_paused("r"));
        drop(channel);

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_sinks_receive_every_event() {
        let sink = Arc::new(CollectingEventSink::new());
        let channel = EventChannel::with_sinks(4, vec![sink.clone() as Arc<dyn EventSink>]);

        channel.publish(PipelineEvent::run_started("a"));
        channel.publish(PipelineEvent::run_started("b"));

        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_into_stream() {
        let channel = EventChannel::new(8);
        let stream = channel.subscribe(EventFilter::Run("a".into())).into_stream();

        channel.publish(PipelineEvent::run_started("a"));
        channel.publish(PipelineEvent::run_started("z"));
        channel.publish(PipelineEvent::run_completed("a", &[]));
        drop(channel);

        let kinds: Vec<EventKind> = stream.map(|e| e.kind()).collect().await;
        assert_eq!(kinds, vec![EventKind::RunStarted, EventKind::RunCompleted]);
    }
}
