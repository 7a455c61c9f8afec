//! Observability utilities.
//!
//! - [`init_tracing`] installs the `tracing` subscriber from [`LoggingConfig`](crate::config::LoggingConfig)
//! - span attribute types and [`SpanTimer`] used by the run loop

mod spans;
mod subscriber;

pub use spans::{PipelineSpanAttributes, SpanTimer, StageSpanAttributes};
pub use subscriber::init_tracing;
