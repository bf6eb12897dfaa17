/// Install an env-filtered fmt subscriber as the global default.
///
/// Reads `RUST_LOG`, falling back to `default_filter`. Returns `false` if a
/// global subscriber was already set.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(default_filter: &str) -> bool {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_names(true))
        .try_init()
        .is_ok()
}
