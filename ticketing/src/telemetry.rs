//! Tracing subscriber setup.

use crate::config::TelemetryConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// the configured directive.
///
/// Returns `false` if a global subscriber was already installed; the existing
/// one is kept.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_keeps_existing_subscriber() {
        let config = TelemetryConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
