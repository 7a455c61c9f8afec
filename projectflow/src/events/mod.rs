//! Event channel for pipeline observability.
//!
//! The orchestrator and stages publish [`PipelineEvent`](crate::core::PipelineEvent)s
//! on an [`EventChannel`]. Delivery is best effort: publishing never blocks and
//! never fails, subscribers receive events in emission order while attached,
//! and nothing is replayed.

mod channel;
mod sink;

pub use channel::{EventChannel, EventFilter, EventSubscription};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink};
