//! Utilities - shared constants and tracing setup

pub mod constants;

pub use constants::*;

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`
///
/// Returns `false` when a global subscriber is already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init()
        .is_ok()
}
