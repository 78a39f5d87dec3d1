//! Structured logging.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this
//! crate and to `tower_http`'s request spans.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

pub fn default_filter(config: &ObservabilityConfig) -> String {
    let level = config.log_level.trim();
    format!("storefront_gate={level},tower_http={level}")
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let config = ObservabilityConfig {
            log_level: "debug".to_string(),
            ..ObservabilityConfig::default()
        };
        assert_eq!(default_filter(&config), "storefront_gate=debug,tower_http=debug");
    }
}
