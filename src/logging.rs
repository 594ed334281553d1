use tracing_subscriber::EnvFilter;

/// Always-on operator messages (dry-run notices, skipped work).
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        tracing::info!($($arg)*)
    };
}

/// Payload dumps and raw call output, only shown with `--verbose`.
#[macro_export]
macro_rules! log_if_verbose {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

/// Logs go to stderr so that stdout only ever carries rendered tables.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (e.g. from tests) is harmless, so the error is dropped.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
