//! Tracing setup for the server binary.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Initialize the global subscriber. `RUST_LOG` overrides the INFO default.
pub fn init() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
