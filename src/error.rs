//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to
//! handle the different kinds of failure an acquisition session can run into,
//! from serial transport problems to trial file I/O.
//!
//! ## Error Hierarchy
//!
//! - **`Transport`** / **`SerialPortNotConnected`**: the hardware link could not be
//!   opened or dropped. Fatal to the owning worker.
//! - **`AckTimeout`**: the sensor did not acknowledge a command within the
//!   configured bound.
//! - **`BufferExhausted`**: a trial produced more rows than the preallocated
//!   trial buffer holds. Fatal to the trial, not to the worker.
//! - **`FileIo`** / **`Io`** / **`Csv`**: trial file creation, writing or closing failed.
//! - **`SetupProtocol`**: the setup channel delivered values out of the agreed order.
//! - **`Config`** / **`Configuration`**: settings could not be loaded, or an operator
//!   request was rejected (e.g. starting a trial before setup).
//! - **`FeatureNotEnabled`**: functionality compiled out via feature flags.
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error types
//! with the `?` operator.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every failure the acquisition core can surface.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Settings could not be parsed or merged.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Settings parsed but are semantically invalid, or an operator request
    /// is not allowed in the current state.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Plain I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failure.
    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The hardware link could not be opened or failed mid-session.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A transport operation was attempted on a closed link.
    #[error("Serial port not connected")]
    SerialPortNotConnected,

    /// The sensor never produced an acknowledgement line.
    #[error("No acknowledgement from sensor within {0:?}")]
    AckTimeout(std::time::Duration),

    /// The trial outgrew its preallocated buffer.
    #[error("Trial buffer exhausted after {capacity} rows")]
    BufferExhausted {
        /// Capacity of the buffer that overflowed.
        capacity: usize,
    },

    /// A trial file could not be opened, written or closed.
    #[error("Trial file error on {path}: {message}")]
    FileIo {
        /// File the operation targeted.
        path: PathBuf,
        /// Underlying failure description.
        message: String,
    },

    /// The setup channel delivered an unexpected value or was disconnected.
    #[error("Setup protocol error: {0}")]
    SetupProtocol(String),

    /// Feature compiled out.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    /// A worker thread panicked instead of exiting cleanly.
    #[error("Worker '{0}' panicked")]
    WorkerPanicked(String),

    /// One or more workers failed to shut down cleanly.
    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<DaqError>),
}

impl DaqError {
    /// Wraps any displayable failure on `path` as a [`DaqError::FileIo`].
    pub fn file_io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        DaqError::FileIo {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::Transport("port vanished".to_string());
        assert_eq!(err.to_string(), "Transport error: port vanished");
    }

    #[test]
    fn test_buffer_exhausted_display() {
        let err = DaqError::BufferExhausted { capacity: 50_000 };
        assert_eq!(err.to_string(), "Trial buffer exhausted after 50000 rows");
    }

    #[test]
    fn test_file_io_helper() {
        let err = DaqError::file_io("/d/E1_P1_ft_0.csv", "disk full");
        assert!(err.to_string().contains("/d/E1_P1_ft_0.csv"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_shutdown_failed_error() {
        let err = DaqError::ShutdownFailed(vec![
            DaqError::WorkerPanicked("camera".into()),
            DaqError::SerialPortNotConnected,
        ]);
        assert!(err.to_string().contains("Shutdown failed"));
    }
}
