//! Tracing subscriber setup.
//!
//! The client never installs a subscriber on its own; the embedder opts in
//! via the `enableLogging` setting or by calling [`init_logging`] directly.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber honoring `RUST_LOG`.
///
/// No-op when `enabled` is false or when a subscriber is already set
/// (repeated calls and test harnesses are safe).
pub fn init_logging(enabled: bool) {
    if !enabled {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_is_noop() {
        init_logging(false);
    }

    #[test]
    fn repeated_init_does_not_panic() {
        init_logging(true);
        init_logging(true);
    }
}
