use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber writing to stderr.
///
/// `RUST_LOG` wins over `fallback_filter`, which wins over `info`. Calling
/// this more than once keeps the first subscriber.
pub fn init_tracing(fallback_filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_filter.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
