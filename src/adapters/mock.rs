//! Mock and simulated line transports.
//!
//! - [`MockTransport`] replays a scripted list of lines and records every
//!   command it receives. Used by tests.
//! - [`SimulatedForceTorque`] behaves like the force/torque controller: it
//!   echoes commands until streaming is started with `QS`, then emits paced
//!   frames. Used with the `simulated` driver.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::LineTransport;
use crate::error::{AppResult, DaqError};

/// Shared record of the commands a mock transport received.
#[derive(Clone, Debug, Default)]
pub struct TransportLog {
    commands: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

impl TransportLog {
    fn push(&self, command: &str) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());
    }

    /// Commands written so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True once the transport was closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_closed(&self) {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }
}

/// What a [`MockTransport`] does once its script runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenExhausted {
    /// Behave like a read timeout with no data.
    Empty,
    /// Behave like a dropped link.
    Disconnect,
}

/// Scripted transport.
#[derive(Debug)]
pub struct MockTransport {
    lines: VecDeque<String>,
    log: TransportLog,
    open: bool,
    refuse_open: bool,
    exhausted: WhenExhausted,
    read_delay: Duration,
}

impl MockTransport {
    /// Transport that returns `lines` in order, then empty reads.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            log: TransportLog::default(),
            open: false,
            refuse_open: false,
            exhausted: WhenExhausted::Empty,
            read_delay: Duration::ZERO,
        }
    }

    /// Transport whose `open` always fails.
    pub fn unreachable() -> Self {
        Self {
            refuse_open: true,
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Choose the behaviour after the script runs out.
    pub fn when_exhausted(mut self, exhausted: WhenExhausted) -> Self {
        self.exhausted = exhausted;
        self
    }

    /// Sleep this long inside every read, like a paced sensor.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Handle to the command log, valid after the transport moves away.
    pub fn log(&self) -> TransportLog {
        self.log.clone()
    }
}

impl LineTransport for MockTransport {
    fn open(&mut self) -> AppResult<()> {
        if self.refuse_open {
            return Err(DaqError::Transport("mock port refused to open".to_string()));
        }
        self.open = true;
        Ok(())
    }

    fn write_line(&mut self, command: &str) -> AppResult<()> {
        if !self.open {
            return Err(DaqError::SerialPortNotConnected);
        }
        self.log.push(command);
        Ok(())
    }

    fn read_line(&mut self) -> AppResult<String> {
        if !self.open {
            return Err(DaqError::SerialPortNotConnected);
        }
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        match self.lines.pop_front() {
            Some(line) => Ok(line),
            None => match self.exhausted {
                WhenExhausted::Empty => Ok(String::new()),
                WhenExhausted::Disconnect => {
                    Err(DaqError::Transport("mock link dropped".to_string()))
                }
            },
        }
    }

    fn close(&mut self) -> AppResult<()> {
        if self.open {
            self.open = false;
            self.log.mark_closed();
        }
        Ok(())
    }
}

/// In-process stand-in for the force/torque controller.
#[derive(Debug)]
pub struct SimulatedForceTorque {
    open: bool,
    streaming: bool,
    pending_echo: Option<String>,
    tick: u64,
    period: Duration,
}

impl SimulatedForceTorque {
    /// Simulated sensor emitting one frame per `period` once streaming.
    pub fn new(period: Duration) -> Self {
        Self {
            open: false,
            streaming: false,
            pending_echo: None,
            tick: 0,
            period,
        }
    }

    fn frame(&self) -> String {
        let t = self.tick as f64 * 0.01;
        let counts = [
            (200.0 * (t).sin()) as i64,
            (200.0 * (t * 0.5).cos()) as i64,
            (1000.0 + 400.0 * (t * 0.2).sin()) as i64,
            (8000.0 * 0.1 * (t).cos()) as i64,
            (8000.0 * 0.05 * (t * 0.3).sin()) as i64,
            0,
        ];
        format!(
            "0,{},{},{},{},{},{}\r\n",
            counts[0], counts[1], counts[2], counts[3], counts[4], counts[5]
        )
    }
}

impl LineTransport for SimulatedForceTorque {
    fn open(&mut self) -> AppResult<()> {
        self.open = true;
        Ok(())
    }

    fn write_line(&mut self, command: &str) -> AppResult<()> {
        if !self.open {
            return Err(DaqError::SerialPortNotConnected);
        }
        let command = command.trim();
        match command {
            "QS" => self.streaming = true,
            // Any input stops streaming on the real controller.
            _ => self.streaming = false,
        }
        self.pending_echo = Some(format!("{}\r\n", command));
        Ok(())
    }

    fn read_line(&mut self) -> AppResult<String> {
        if !self.open {
            return Err(DaqError::SerialPortNotConnected);
        }
        std::thread::sleep(self.period);
        if self.streaming {
            self.tick += 1;
            return Ok(self.frame());
        }
        // The echo of the last command is followed by a prompt carrying its
        // status code.
        Ok(self
            .pending_echo
            .take()
            .unwrap_or_else(|| ">0\r\n".to_string()))
    }

    fn close(&mut self) -> AppResult<()> {
        self.open = false;
        self.streaming = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_replays_script_then_empty() {
        let mut transport = MockTransport::new(["a", "b"]);
        transport.open().unwrap();
        assert_eq!(transport.read_line().unwrap(), "a");
        assert_eq!(transport.read_line().unwrap(), "b");
        assert_eq!(transport.read_line().unwrap(), "");
    }

    #[test]
    fn test_mock_records_commands_and_close() {
        let mut transport = MockTransport::new(Vec::<String>::new());
        let log = transport.log();
        transport.open().unwrap();
        transport.write_line("SB").unwrap();
        transport.close().unwrap();
        assert_eq!(log.commands(), vec!["SB".to_string()]);
        assert!(log.is_closed());
    }

    #[test]
    fn test_mock_disconnect_after_script() {
        let mut transport = MockTransport::new(["x"]).when_exhausted(WhenExhausted::Disconnect);
        transport.open().unwrap();
        transport.read_line().unwrap();
        assert!(matches!(transport.read_line(), Err(DaqError::Transport(_))));
    }

    #[test]
    fn test_unreachable_mock_refuses_open() {
        assert!(MockTransport::unreachable().open().is_err());
    }

    #[test]
    fn test_simulated_sensor_streams_after_qs() {
        let mut sensor = SimulatedForceTorque::new(Duration::ZERO);
        sensor.open().unwrap();
        sensor.write_line("SF 1650").unwrap();
        assert_eq!(sensor.read_line().unwrap().trim(), "SF 1650");
        sensor.write_line("QS").unwrap();
        let frame = sensor.read_line().unwrap();
        assert_eq!(frame.trim().split(',').count(), 7);
    }
}
