//! Serial adapter for RS-232 communication
//!
//! Wraps the `serialport` crate in a blocking [`LineTransport`]. Each worker
//! owns its adapter exclusively and calls it from its own thread, so there is
//! no locking here.

use std::time::Duration;
#[cfg(feature = "instrument_serial")]
use tracing::debug;

use super::LineTransport;
use crate::error::{AppResult, DaqError};

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::io::{BufRead, BufReader, Write};

/// Line terminator appended to every command.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Serial adapter for line-based instruments.
pub struct SerialAdapter {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Read timeout
    timeout: Duration,

    #[cfg(feature = "instrument_serial")]
    port: Option<BufReader<Box<dyn SerialPort>>>,
}

impl SerialAdapter {
    /// Create a new serial adapter with the default 50 ms read timeout.
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    /// * `baud_rate` - Communication speed (e.g., 9600, 115200)
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: Duration::from_millis(50),
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    /// Override the read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Port path.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// True once [`LineTransport::open`] succeeded and until `close`.
    pub fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_serial")]
        {
            self.port.is_some()
        }
        #[cfg(not(feature = "instrument_serial"))]
        {
            false
        }
    }
}

#[cfg(feature = "instrument_serial")]
impl LineTransport for SerialAdapter {
    fn open(&mut self) -> AppResult<()> {
        // Re-opening drops any previous handle first.
        self.port = None;

        let port = serialport::new(&self.port_name, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(self.timeout)
            .open()
            .map_err(|e| {
                DaqError::Transport(format!(
                    "Failed to open serial port '{}' at {} baud: {}",
                    self.port_name, self.baud_rate, e
                ))
            })?;

        self.port = Some(BufReader::new(port));
        debug!(port = %self.port_name, baud = self.baud_rate, "serial port opened");
        Ok(())
    }

    fn write_line(&mut self, command: &str) -> AppResult<()> {
        let port = self.port.as_mut().ok_or(DaqError::SerialPortNotConnected)?;
        let line = format!("{}{}", command, LINE_TERMINATOR);

        let writer = port.get_mut();
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| DaqError::Transport(format!("Failed to write to serial port: {}", e)))?;

        debug!(port = %self.port_name, command = command.trim(), "sent serial command");
        Ok(())
    }

    fn read_line(&mut self) -> AppResult<String> {
        let port = self.port.as_mut().ok_or(DaqError::SerialPortNotConnected)?;
        let mut buffer = Vec::new();

        match port.read_until(b'\n', &mut buffer) {
            Ok(0) => {
                return Err(DaqError::Transport(
                    "Unexpected EOF from serial port".to_string(),
                ))
            }
            Ok(_) => {}
            // Bytes read before the timeout stay in `buffer`.
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => return Err(DaqError::Transport(format!("Serial read error: {}", e))),
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn close(&mut self) -> AppResult<()> {
        if self.port.take().is_some() {
            debug!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }
}

#[cfg(not(feature = "instrument_serial"))]
impl LineTransport for SerialAdapter {
    fn open(&mut self) -> AppResult<()> {
        Err(DaqError::FeatureNotEnabled("instrument_serial".to_string()))
    }

    fn write_line(&mut self, _command: &str) -> AppResult<()> {
        Err(DaqError::SerialPortNotConnected)
    }

    fn read_line(&mut self) -> AppResult<String> {
        Err(DaqError::SerialPortNotConnected)
    }

    fn close(&mut self) -> AppResult<()> {
        Ok(())
    }
}
