//! Hardware seams for the non-serial sources.
//!
//! Each worker owns exactly one device behind one of these traits. The
//! simulated implementations in [`mock`] stand in for the bus-attached
//! inertial sensor, the camera and the synchronization LEDs.

pub mod mock;

pub use mock::{CameraProbe, LedProbe, SimulatedCamera, SimulatedInertial, SimulatedLed};

use std::path::Path;

use crate::channels::CameraMode;
use crate::error::AppResult;

/// Orientation + linear acceleration sensor.
pub trait InertialSensor: Send {
    /// Acquire the bus and the device.
    fn open(&mut self) -> AppResult<()>;

    /// `[roll, pitch, yaw, ax, ay, az]`. A channel the device could not
    /// produce this time is `None`.
    fn read(&mut self) -> AppResult<[Option<f64>; 6]>;

    /// Release the device.
    fn close(&mut self) -> AppResult<()>;
}

/// Video camera with a hardware frame clock.
pub trait CameraDevice: Send {
    /// Acquire the device.
    fn open(&mut self) -> AppResult<()>;

    /// Apply capture resolution and frame rate.
    fn configure(&mut self, mode: CameraMode) -> AppResult<()>;

    /// Start encoding video into `video_path`.
    fn start_recording(&mut self, video_path: &Path) -> AppResult<()>;

    /// Stop encoding. No-op when not recording.
    fn stop_recording(&mut self) -> AppResult<()>;

    /// True while encoding.
    fn is_recording(&self) -> bool;

    /// Device timestamp of the most recent frame, in seconds.
    fn latest_frame_timestamp(&mut self) -> Option<f64>;

    /// Show the live preview in `window` (`[x, y, width, height]`).
    fn start_preview(&mut self, window: [u32; 4]) -> AppResult<()>;

    /// Hide the live preview.
    fn stop_preview(&mut self) -> AppResult<()>;

    /// Release the device.
    fn close(&mut self) -> AppResult<()>;
}

/// An LED used as a hardware-visible synchronization fiducial.
pub trait SyncLed: Send {
    /// Switch the LED.
    fn set(&mut self, on: bool) -> AppResult<()>;
}
