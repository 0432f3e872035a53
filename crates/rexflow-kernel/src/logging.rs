//! Subscriber setup for the binary

use tracing_subscriber::EnvFilter;

/// Default level when neither `RUST_LOG` nor `--log-level` is given
pub const DEFAULT_LEVEL: &str = "info";

/// Install the global tracing subscriber
///
/// An explicit `level` wins over `RUST_LOG`; without either,
/// [`DEFAULT_LEVEL`] applies. Calling it twice is harmless.
pub fn init(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
