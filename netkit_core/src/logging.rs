//! Process-global logging init.
//!
//! Library code only ever emits `tracing` events; binaries call
//! [`init`] once at startup to install a subscriber. Logging is process-wide
//! rather than per-connection, and `tracing-subscriber`'s writer already
//! serializes concurrent output, so there's no separate lock to manage here.

/// Installs a `tracing-subscriber` `fmt` layer honoring `RUST_LOG`,
/// defaulting to `info` when unset.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
