//! Tracing subscriber initialisation.

use crate::config::LoggingConfig;
use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to this
/// crate and `warn` to everything else. Only the first call has an effect,
/// and an already installed foreign subscriber is left in place.
pub fn init_tracing(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config));

        let result = if config.json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(true))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true))
                .try_init()
        };

        if let Err(err) = result {
            tracing::debug!(error = %err, "Tracing subscriber already installed");
        }
    });
}

fn default_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::new(format!("warn,projectflow={}", config.level))
}
