//! ATI Mini40 force/torque sensor driver
//!
//! The sensor's controller box streams comma-separated ASCII lines of exactly
//! seven fields once continuous output is started (`QS`):
//!
//! ```text
//! <tag>,<fx>,<fy>,<fz>,<tx>,<ty>,<tz>\r\n
//! ```
//!
//! Fields 1-6 are signed raw counts. Forces convert at 200 counts/N and
//! torques at 8000 counts/Nm. A line that does not split into seven integer
//! fields is reported as [`Readings::Invalid`]; zero is a legitimate reading.
//!
//! ## Initialization handshake
//!
//! | Step | Commands | Purpose |
//! |------|----------|---------|
//! | 1 | `SB`, `SF <rate>` | bias, set sample frequency |
//! | 2 | `TF 0` | select the raw (untransformed) calibration |
//! | 3 | `TC <slot>, Inst, dx, dy, dz, rx, ry, rz` | define the experiment's transform |
//! | 4 | `TF <slot>` | select the transformed calibration |
//! | 5 | `SB`, `QS` | re-bias, start streaming |
//!
//! Each step is followed by the settle delay and an acknowledgement scan that
//! reads lines until one containing a digit shows up, bounded by the ack timeout.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::adapters::LineTransport;
use crate::config::ForceTorqueSettings;
use crate::core::Readings;
use crate::error::{AppResult, DaqError};

/// Raw counts per Newton.
pub const FORCE_COUNTS_PER_NEWTON: f64 = 200.0;
/// Raw counts per Newton-metre.
pub const TORQUE_COUNTS_PER_NEWTON_METRE: f64 = 8000.0;
/// Fields in one streamed line (tag + six channels).
pub const FIELD_COUNT: usize = 7;

/// Convert one streamed line into calibrated channels.
pub fn parse_frame(line: &str) -> Readings {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Readings::Invalid;
    }

    let mut values = [0.0f64; 6];
    for (i, field) in fields[1..].iter().enumerate() {
        let raw: i64 = match field.trim().parse() {
            Ok(raw) => raw,
            Err(_) => return Readings::Invalid,
        };
        let scale = if i < 3 {
            FORCE_COUNTS_PER_NEWTON
        } else {
            TORQUE_COUNTS_PER_NEWTON_METRE
        };
        values[i] = raw as f64 / scale;
    }
    Readings::Channels(values)
}

/// The command groups of the start-up handshake, in order.
pub fn handshake_steps(settings: &ForceTorqueSettings) -> Vec<Vec<String>> {
    let t = settings.transform;
    vec![
        vec!["SB".to_string(), format!("SF {}", settings.sample_rate)],
        vec!["TF 0".to_string()],
        vec![format!(
            "TC {}, Inst, {}, {}, {}, {}, {}, {}",
            settings.transform_slot, t[0], t[1], t[2], t[3], t[4], t[5]
        )],
        vec![format!("TF {}", settings.transform_slot)],
        bias_commands(),
    ]
}

fn bias_commands() -> Vec<String> {
    vec!["SB".to_string(), "QS".to_string()]
}

/// Driver for one sensor over any [`LineTransport`].
pub struct AtiMini40<T: LineTransport> {
    transport: T,
    settings: ForceTorqueSettings,
    connected: bool,
}

impl<T: LineTransport> AtiMini40<T> {
    /// Wrap `transport`; nothing is sent until [`AtiMini40::connect`].
    pub fn new(transport: T, settings: ForceTorqueSettings) -> Self {
        Self {
            transport,
            settings,
            connected: false,
        }
    }

    /// Open the link and run the full initialization handshake.
    pub fn connect(&mut self) -> AppResult<()> {
        self.transport.open()?;
        self.connected = true;

        for (i, step) in handshake_steps(&self.settings).iter().enumerate() {
            self.run_step(step)
                .map_err(|e| DaqError::Transport(format!("handshake step {} failed: {}", i + 1, e)))?;
        }
        info!("force/torque sensor initialized and streaming");
        Ok(())
    }

    /// Re-bias the sensor and restart streaming.
    pub fn rebias(&mut self) -> AppResult<()> {
        self.run_step(&bias_commands())?;
        info!("force/torque sensor biased");
        Ok(())
    }

    fn run_step(&mut self, commands: &[String]) -> AppResult<()> {
        for command in commands {
            self.transport.write_line(command)?;
        }
        std::thread::sleep(self.settings.settle());
        self.await_ack(self.settings.ack_timeout())
    }

    /// Read lines until one contains a digit, or fail after `timeout`.
    fn await_ack(&mut self, timeout: Duration) -> AppResult<()> {
        let start = Instant::now();
        loop {
            let line = self.transport.read_line()?;
            if line.chars().any(|c| c.is_ascii_digit()) {
                debug!(ack = line.trim(), "sensor acknowledged");
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(DaqError::AckTimeout(timeout));
            }
        }
    }

    /// Read and convert one line. Transport failures are errors; malformed
    /// lines come back as [`Readings::Invalid`].
    pub fn read_frame(&mut self) -> AppResult<Readings> {
        let line = self.transport.read_line()?;
        Ok(parse_frame(&line))
    }

    /// Stop streaming and release the port.
    pub fn disconnect(&mut self) -> AppResult<()> {
        if self.connected {
            self.connected = false;
            // A bare terminator stops streaming.
            if let Err(e) = self.transport.write_line("") {
                warn!(error = %e, "could not stop force/torque streaming");
            }
        }
        self.transport.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockTransport;

    fn fast_settings() -> ForceTorqueSettings {
        ForceTorqueSettings {
            settle_ms: 0,
            ack_timeout_ms: 50,
            ..ForceTorqueSettings::default()
        }
    }

    #[test]
    fn test_parse_valid_line() {
        let readings = parse_frame("0,200,-400,0,8000,-16000,4000\r\n");
        assert_eq!(
            readings,
            Readings::Channels([1.0, -2.0, 0.0, 1.0, -2.0, 0.5])
        );
    }

    #[test]
    fn test_parse_wrong_field_counts_are_invalid() {
        for line in ["", "\r\n", "0,1,2,3,4,5", "0,1,2,3,4,5,6,7", "0,1,2,,3,4,5,6"] {
            assert_eq!(parse_frame(line), Readings::Invalid, "line {:?}", line);
        }
    }

    #[test]
    fn test_parse_non_numeric_field_is_invalid() {
        assert_eq!(parse_frame("0,1,2,x,4,5,6"), Readings::Invalid);
    }

    #[test]
    fn test_handshake_commands() {
        let steps = handshake_steps(&ForceTorqueSettings::default());
        let flat: Vec<String> = steps.into_iter().flatten().collect();
        assert_eq!(
            flat,
            vec![
                "SB",
                "SF 1650",
                "TF 0",
                "TC 2, Inst, 225, -130, 0, 1800, 0, 1199",
                "TF 2",
                "SB",
                "QS"
            ]
        );
    }

    #[test]
    fn test_connect_runs_handshake() {
        let transport = MockTransport::new([">0", ">0", ">0", ">0", "0,1,2,3,4,5,6"]);
        let log = transport.log();
        let mut sensor = AtiMini40::new(transport, fast_settings());
        sensor.connect().unwrap();
        assert_eq!(log.commands().len(), 7);
        assert_eq!(log.commands().last().map(String::as_str), Some("QS"));
    }

    #[test]
    fn test_ack_scan_skips_lines_without_digits() {
        let transport = MockTransport::new(["SB", ">", "ok 1"]);
        let mut sensor = AtiMini40::new(transport, fast_settings());
        sensor.transport.open().unwrap();
        sensor.rebias().unwrap();
    }

    #[test]
    fn test_ack_scan_is_bounded() {
        let transport = MockTransport::new(Vec::<String>::new());
        let mut sensor = AtiMini40::new(transport, fast_settings());
        sensor.transport.open().unwrap();
        let start = Instant::now();
        assert!(matches!(sensor.rebias(), Err(DaqError::AckTimeout(_))));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_connect_fails_when_port_unavailable() {
        let mut sensor = AtiMini40::new(MockTransport::unreachable(), fast_settings());
        assert!(matches!(sensor.connect(), Err(DaqError::Transport(_))));
    }

    #[test]
    fn test_disconnect_stops_streaming_and_closes() {
        let transport = MockTransport::new([">0"; 5]);
        let log = transport.log();
        let mut sensor = AtiMini40::new(transport, fast_settings());
        sensor.connect().unwrap();
        sensor.disconnect().unwrap();
        assert_eq!(log.commands().last().map(String::as_str), Some(""));
        assert!(log.is_closed());
    }
}
