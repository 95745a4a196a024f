//! Simulated Hardware Implementations
//!
//! Provides simulated devices for running a session without physical hardware.
//!
//! # Available Simulations
//!
//! - `SimulatedInertial` - smooth orientation/acceleration waveforms at a fixed period
//! - `SimulatedCamera` - frame clock either following wall time or advancing one
//!   frame per poll (`stepped`, deterministic for tests)
//! - `SimulatedLed` - records every switch
//!
//! Camera and LED expose a probe handle so tests can observe device state
//! after the device has moved into a worker.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{CameraDevice, InertialSensor, SyncLed};
use crate::channels::CameraMode;
use crate::error::{AppResult, DaqError};

// =============================================================================
// SimulatedInertial
// =============================================================================

/// Simulated inertial sensor.
pub struct SimulatedInertial {
    period: Duration,
    tick: u64,
    open: bool,
    // Every n-th read reports a missing channel; 0 disables.
    dropout_every: u64,
}

impl SimulatedInertial {
    /// Sensor producing one reading per `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            tick: 0,
            open: false,
            dropout_every: 0,
        }
    }

    /// Make every `n`-th read lose its yaw channel.
    pub fn with_dropouts(mut self, n: u64) -> Self {
        self.dropout_every = n;
        self
    }
}

impl InertialSensor for SimulatedInertial {
    fn open(&mut self) -> AppResult<()> {
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> AppResult<[Option<f64>; 6]> {
        if !self.open {
            return Err(DaqError::Transport("inertial sensor not open".to_string()));
        }
        if !self.period.is_zero() {
            std::thread::sleep(self.period);
        }
        self.tick += 1;
        let t = self.tick as f64 * 0.01;
        let yaw = if self.dropout_every > 0 && self.tick % self.dropout_every == 0 {
            None
        } else {
            Some((t * 10.0) % 360.0)
        };
        Ok([
            Some(5.0 * t.sin()),
            Some(3.0 * t.cos()),
            yaw,
            Some(0.1 * (2.0 * t).sin()),
            Some(0.2 * t.cos()),
            Some(0.05),
        ])
    }

    fn close(&mut self) -> AppResult<()> {
        self.open = false;
        Ok(())
    }
}

// =============================================================================
// SimulatedCamera
// =============================================================================

/// Observable state of a [`SimulatedCamera`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraState {
    /// Device open.
    pub open: bool,
    /// Applied capture mode.
    pub mode: Option<CameraMode>,
    /// Currently encoding.
    pub recording: bool,
    /// Every video file recording was started into.
    pub videos: Vec<PathBuf>,
    /// Preview visible.
    pub preview_on: bool,
    /// Released.
    pub closed: bool,
}

/// Read-only handle on a simulated camera's state.
#[derive(Clone, Debug, Default)]
pub struct CameraProbe(Arc<Mutex<CameraState>>);

impl CameraProbe {
    fn lock(&self) -> MutexGuard<'_, CameraState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CameraState {
        self.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameClock {
    WallTime,
    Stepped,
}

/// Simulated camera.
pub struct SimulatedCamera {
    state: CameraProbe,
    clock: FrameClock,
    started: Option<Instant>,
    frames: u64,
}

impl SimulatedCamera {
    /// Camera whose frames follow wall time at the configured frame rate.
    pub fn new() -> Self {
        Self {
            state: CameraProbe::default(),
            clock: FrameClock::WallTime,
            started: None,
            frames: 0,
        }
    }

    /// Camera that produces exactly one new frame per timestamp poll while recording.
    pub fn stepped() -> Self {
        Self {
            clock: FrameClock::Stepped,
            ..Self::new()
        }
    }

    /// Handle for observing the camera after it moves into a worker.
    pub fn probe(&self) -> CameraProbe {
        self.state.clone()
    }

    fn frame_rate(&self) -> f64 {
        self.state
            .lock()
            .mode
            .map(|m| m.frame_rate as f64)
            .unwrap_or(30.0)
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for SimulatedCamera {
    fn open(&mut self) -> AppResult<()> {
        let mut state = self.state.lock();
        state.open = true;
        state.closed = false;
        Ok(())
    }

    fn configure(&mut self, mode: CameraMode) -> AppResult<()> {
        self.state.lock().mode = Some(mode);
        Ok(())
    }

    fn start_recording(&mut self, video_path: &Path) -> AppResult<()> {
        // The simulated encoder produces an empty stream file.
        File::create(video_path).map_err(|e| DaqError::file_io(video_path, e))?;
        let mut state = self.state.lock();
        state.recording = true;
        state.videos.push(video_path.to_path_buf());
        drop(state);
        self.started = Some(Instant::now());
        self.frames = 0;
        Ok(())
    }

    fn stop_recording(&mut self) -> AppResult<()> {
        self.state.lock().recording = false;
        self.started = None;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    fn latest_frame_timestamp(&mut self) -> Option<f64> {
        let started = self.started?;
        let fps = self.frame_rate();
        match self.clock {
            FrameClock::Stepped => {
                self.frames += 1;
            }
            FrameClock::WallTime => {
                self.frames = (started.elapsed().as_secs_f64() * fps) as u64;
                if self.frames == 0 {
                    return None;
                }
            }
        }
        Some(self.frames as f64 / fps)
    }

    fn start_preview(&mut self, _window: [u32; 4]) -> AppResult<()> {
        self.state.lock().preview_on = true;
        Ok(())
    }

    fn stop_preview(&mut self) -> AppResult<()> {
        self.state.lock().preview_on = false;
        Ok(())
    }

    fn close(&mut self) -> AppResult<()> {
        let mut state = self.state.lock();
        state.open = false;
        state.recording = false;
        state.preview_on = false;
        state.closed = true;
        Ok(())
    }
}

// =============================================================================
// SimulatedLed
// =============================================================================

/// History of LED switches.
#[derive(Clone, Debug, Default)]
pub struct LedProbe(Arc<Mutex<Vec<bool>>>);

impl LedProbe {
    /// Every state the LED was switched to, in order.
    pub fn history(&self) -> Vec<bool> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Current state (off if never switched).
    pub fn is_on(&self) -> bool {
        self.history().last().copied().unwrap_or(false)
    }
}

/// Simulated LED.
#[derive(Default)]
pub struct SimulatedLed {
    probe: LedProbe,
}

impl SimulatedLed {
    /// LED starting off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for observing the LED.
    pub fn probe(&self) -> LedProbe {
        self.probe.clone()
    }
}

impl SyncLed for SimulatedLed {
    fn set(&mut self, on: bool) -> AppResult<()> {
        self.probe
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(on);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inertial_requires_open() {
        let mut imu = SimulatedInertial::new(Duration::ZERO);
        assert!(imu.read().is_err());
        imu.open().unwrap();
        assert!(imu.read().unwrap().iter().all(Option::is_some));
    }

    #[test]
    fn test_inertial_dropouts() {
        let mut imu = SimulatedInertial::new(Duration::ZERO).with_dropouts(2);
        imu.open().unwrap();
        assert!(imu.read().unwrap()[2].is_some());
        assert!(imu.read().unwrap()[2].is_none());
    }

    #[test]
    fn test_stepped_camera_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut camera = SimulatedCamera::stepped();
        camera.open().unwrap();
        camera
            .configure(CameraMode {
                width: 640,
                height: 480,
                frame_rate: 10,
            })
            .unwrap();
        assert_eq!(camera.latest_frame_timestamp(), None);

        let video = dir.path().join("v.h264");
        camera.start_recording(&video).unwrap();
        assert!(video.exists());
        assert_eq!(camera.latest_frame_timestamp(), Some(0.1));
        assert_eq!(camera.latest_frame_timestamp(), Some(0.2));
        camera.stop_recording().unwrap();
        assert_eq!(camera.latest_frame_timestamp(), None);
    }

    #[test]
    fn test_led_history() {
        let mut led = SimulatedLed::new();
        let probe = led.probe();
        led.set(true).unwrap();
        led.set(false).unwrap();
        assert_eq!(probe.history(), vec![true, false]);
        assert!(!probe.is_on());
    }
}
