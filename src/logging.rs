//! Tracing subscriber setup.
//!
//! Logs go to stderr so `--json` output on stdout stays machine readable.
//! `RUST_LOG`, when set, takes priority over the configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber at `level`.
///
/// Returns `false` when a subscriber was already installed; the existing
/// one is kept.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_a_noop() {
        init("debug");
        assert!(!init("info"));
        tracing::info!("still logging after a repeated init");
    }
}
