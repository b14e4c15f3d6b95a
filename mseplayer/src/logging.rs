//! Logging initialisation

use mseplayer_core::{PlayerError, PlayerResult};
use tracing_subscriber::EnvFilter;

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`, or by `filter`
/// when the variable is unset.
///
/// Returns `Ok(false)` when a global subscriber is already installed, so it is
/// safe to call from every test or embedding entry point.
pub fn init_logging(filter: &str) -> PlayerResult<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter).map_err(|e| PlayerError::Configuration {
            field: "log_filter".to_string(),
            reason: e.to_string(),
        })?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok();
    Ok(installed)
}
