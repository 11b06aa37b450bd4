//! Tracing initialization shared by binaries and tests

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with an env-filter.
/// `RUST_LOG` wins over the provided default level.
pub fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}
