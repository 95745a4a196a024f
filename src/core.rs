//! Core data types shared by every worker.
//!
//! # Data Flow
//!
//! ```text
//! hardware --[SampleFrame]--> TrialBuffer --(stop)--> TrialSink (csv/txt)
//!                       \---> telemetry channel (best effort) ---> display
//! ```
//!
//! A [`SampleFrame`] is either fully valid or fully invalid. The sentinel is a
//! tag on the whole frame ([`Readings::Invalid`]) rather than a magic number
//! in each channel, so arithmetic on an unreadable channel does not compile.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Sensor identity
// =============================================================================

/// The three acquisition sources of an instrumented-object session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    /// Six-axis force/torque sensor on a serial link.
    ForceTorque,
    /// Orientation + linear acceleration sensor on a local bus.
    Inertial,
    /// Video camera.
    Camera,
}

impl SensorKind {
    /// Tag used in trial file names.
    pub fn file_tag(&self) -> &'static str {
        match self {
            SensorKind::ForceTorque => "ft",
            SensorKind::Inertial => "IMU",
            SensorKind::Camera => "Camera",
        }
    }

    /// Extension of the primary per-trial table.
    pub fn table_extension(&self) -> &'static str {
        match self {
            SensorKind::ForceTorque | SensorKind::Inertial => "csv",
            SensorKind::Camera => "txt",
        }
    }

    /// Header row of the per-trial table.
    pub fn csv_header(&self) -> &'static [&'static str] {
        match self {
            SensorKind::ForceTorque => &["Time", "fx", "fy", "fz", "tx", "ty", "tz"],
            SensorKind::Inertial => &["Time", "Eula1", "Eula2", "Eula3", "linA1", "linA2", "linA3"],
            SensorKind::Camera => &["Time"],
        }
    }

    /// Number of value channels following the timestamp.
    pub fn channel_count(&self) -> usize {
        self.csv_header().len() - 1
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::ForceTorque => write!(f, "force_torque"),
            SensorKind::Inertial => write!(f, "inertial"),
            SensorKind::Camera => write!(f, "camera"),
        }
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Channel payload of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Readings {
    /// Camera frames carry no channel values, only their timestamp.
    TimestampOnly,
    /// Six calibrated channels, all numeric.
    Channels([f64; 6]),
    /// The read failed; every channel is unreadable.
    Invalid,
}

impl Readings {
    /// Values as written to a table row, with `NaN` standing in for every
    /// channel of an invalid frame.
    pub fn row_values(&self, channel_count: usize) -> Vec<f64> {
        match self {
            Readings::TimestampOnly => Vec::new(),
            Readings::Channels(values) => values.to_vec(),
            Readings::Invalid => vec![f64::NAN; channel_count],
        }
    }

    /// The channels, if the frame is valid.
    pub fn values(&self) -> Option<&[f64; 6]> {
        match self {
            Readings::Channels(values) => Some(values),
            _ => None,
        }
    }

    /// True for [`Readings::Invalid`].
    pub fn is_invalid(&self) -> bool {
        matches!(self, Readings::Invalid)
    }
}

/// One timestamped reading from a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleFrame {
    /// Seconds. Host wall-clock for the sensors, device clock for the camera.
    pub timestamp: f64,
    /// Channel payload.
    pub readings: Readings,
}

impl SampleFrame {
    /// Valid six-channel frame.
    pub fn channels(timestamp: f64, values: [f64; 6]) -> Self {
        Self {
            timestamp,
            readings: Readings::Channels(values),
        }
    }

    /// Invalid frame at `timestamp`.
    pub fn invalid(timestamp: f64) -> Self {
        Self {
            timestamp,
            readings: Readings::Invalid,
        }
    }

    /// Camera frame marker.
    pub fn timestamp_only(timestamp: f64) -> Self {
        Self {
            timestamp,
            readings: Readings::TimestampOnly,
        }
    }

    /// The frame rendered as table cells: timestamp first, then channels.
    pub fn to_record(&self, channel_count: usize) -> Vec<String> {
        std::iter::once(self.timestamp)
            .chain(self.readings.row_values(channel_count))
            .map(|v| v.to_string())
            .collect()
    }
}

/// Current host time as fractional seconds since the Unix epoch.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}
