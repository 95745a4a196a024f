//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured `application.log_level`
//! applies to this crate and `warn` to everything else.

use tracing_subscriber::EnvFilter;

use crate::error::{AppResult, DaqError};

/// Build the filter used by [`init`].
pub fn filter(log_level: &str) -> AppResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(format!("warn,trial_daq={}", log_level))
        .map_err(|e| DaqError::Configuration(format!("Invalid log filter: {}", e)))
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init(log_level: &str) -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(log_level)?)
        .with_thread_names(true)
        .with_target(false)
        .try_init()
        .map_err(|e| DaqError::Configuration(format!("Tracing already initialized: {}", e)))
}
