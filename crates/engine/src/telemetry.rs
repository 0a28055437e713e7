// Tracing setup for embedders without their own subscriber.

/// Install a fmt subscriber filtered by `RUST_LOG`.
///
/// Call at most once per process; embedders with their own subscriber
/// skip this entirely.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
