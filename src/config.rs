//! Configuration System using Figment
//!
//! Settings are loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `TRIALDAQ_` (nested keys separated by `__`)
//! 2. A TOML file (default: `config/default.toml`)
//! 3. Built-in defaults ([`Settings::default`])
//!
//! ```text
//! TRIALDAQ_APPLICATION__LOG_LEVEL=debug
//! TRIALDAQ_FORCE_TORQUE__PORT=/dev/ttyUSB1
//! TRIALDAQ_STORAGE__BUFFER_CAPACITY=100000
//! ```
//!
//! After loading, [`Settings::validate`] rejects values that parse but make no sense.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AppResult, DaqError};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationSettings,
    /// Force/torque sensor (serial) settings
    pub force_torque: ForceTorqueSettings,
    /// Inertial sensor settings
    pub inertial: InertialSettings,
    /// Camera settings
    pub camera: CameraSettings,
    /// Trial storage settings
    pub storage: StorageSettings,
    /// Telemetry channel settings
    pub telemetry: TelemetrySettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "Instrumented object".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Which backend drives a worker's hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Real serial hardware.
    Serial,
    /// In-process simulation.
    Simulated,
}

/// Force/torque sensor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceTorqueSettings {
    /// Hardware backend
    pub driver: DriverKind,
    /// Serial port path
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout of the serial line in milliseconds
    pub read_timeout_ms: u64,
    /// Pause after each handshake command in milliseconds
    pub settle_ms: u64,
    /// Upper bound on an acknowledgement scan in milliseconds
    pub ack_timeout_ms: u64,
    /// Argument of the sample-frequency command
    pub sample_rate: u32,
    /// Calibration slot holding the experiment's coordinate transform
    pub transform_slot: u8,
    /// Translation + rotation of the coordinate transform
    pub transform: [i32; 6],
}

impl Default for ForceTorqueSettings {
    fn default() -> Self {
        Self {
            driver: DriverKind::Serial,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 50,
            settle_ms: 1000,
            ack_timeout_ms: 5000,
            sample_rate: 1650,
            transform_slot: 2,
            transform: [225, -130, 0, 1800, 0, 1199],
        }
    }
}

impl ForceTorqueSettings {
    /// Serial read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Handshake settle delay.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Acknowledgement scan bound.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Inertial sensor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InertialSettings {
    /// Hardware backend
    pub driver: DriverKind,
    /// Bus poll period in milliseconds
    pub period_ms: u64,
}

impl Default for InertialSettings {
    fn default() -> Self {
        Self {
            driver: DriverKind::Simulated,
            period_ms: 10,
        }
    }
}

/// Camera configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Hardware backend
    pub driver: DriverKind,
    /// Preview window as `[x, y, width, height]`
    pub preview_window: [u32; 4],
    /// Recorded frame count at which the sync LEDs switch on
    pub led_on_frame: usize,
    /// Recorded frame count at which the sync LEDs switch off
    pub led_off_frame: usize,
    /// Frame poll interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            driver: DriverKind::Simulated,
            preview_window: [100, 20, 640, 480],
            led_on_frame: 30,
            led_off_frame: 60,
            poll_interval_ms: 2,
        }
    }
}

/// Trial storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Rows a single trial may hold before it is aborted
    pub buffer_capacity: usize,
    /// Create the output folder when it does not exist
    pub create_folders: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 50_000,
            create_folders: true,
        }
    }
}

/// Telemetry channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Pending samples per worker before new ones are dropped
    pub capacity: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

impl Settings {
    /// Load settings from the default location.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load settings from `path`, layered over the defaults and under the environment.
    ///
    /// A missing file is not an error; the defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TRIALDAQ_").split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.force_torque.driver == DriverKind::Serial && self.force_torque.port.trim().is_empty() {
            return Err(DaqError::Configuration(
                "force_torque.port cannot be empty with the serial driver".to_string(),
            ));
        }

        if self.inertial.driver != DriverKind::Simulated {
            return Err(DaqError::Configuration(
                "Invalid inertial driver. Only 'simulated' is available".to_string(),
            ));
        }

        if self.camera.driver != DriverKind::Simulated {
            return Err(DaqError::Configuration(
                "Invalid camera driver. Only 'simulated' is available".to_string(),
            ));
        }

        if self.camera.led_off_frame <= self.camera.led_on_frame {
            return Err(DaqError::Configuration(format!(
                "camera.led_off_frame ({}) must be greater than camera.led_on_frame ({})",
                self.camera.led_off_frame, self.camera.led_on_frame
            )));
        }

        if self.storage.buffer_capacity == 0 {
            return Err(DaqError::Configuration(
                "storage.buffer_capacity must be at least 1".to_string(),
            ));
        }

        if self.telemetry.capacity == 0 {
            return Err(DaqError::Configuration(
                "telemetry.capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
