//! Hardware adapter implementations
//!
//! This module contains implementations of the [`LineTransport`] trait,
//! the low-level I/O abstraction for line-oriented ASCII instruments.

pub mod mock;
pub mod serial_adapter;

pub use mock::{MockTransport, SimulatedForceTorque, TransportLog, WhenExhausted};
pub use serial_adapter::SerialAdapter;

use crate::error::AppResult;

/// A line-oriented, blocking command/response link.
///
/// Every call is bounded by the transport's own read timeout; none of them may
/// block indefinitely.
pub trait LineTransport: Send {
    /// Open the underlying connection.
    fn open(&mut self) -> AppResult<()>;

    /// Send `command` followed by the line terminator.
    fn write_line(&mut self, command: &str) -> AppResult<()>;

    /// Read one line. On a read timeout, returns whatever arrived so far
    /// (possibly an empty string); only a broken link is an error.
    fn read_line(&mut self) -> AppResult<String>;

    /// Release the connection. Closing twice is a no-op.
    fn close(&mut self) -> AppResult<()>;
}

impl LineTransport for Box<dyn LineTransport> {
    fn open(&mut self) -> AppResult<()> {
        (**self).open()
    }

    fn write_line(&mut self, command: &str) -> AppResult<()> {
        (**self).write_line(command)
    }

    fn read_line(&mut self) -> AppResult<String> {
        (**self).read_line()
    }

    fn close(&mut self) -> AppResult<()> {
        (**self).close()
    }
}
