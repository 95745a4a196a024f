//! Camera source: video recording, frame timestamps, sync LEDs and preview.
//!
//! Unlike the sensors, the camera blocks on `setup-done` before its loop
//! because its capture mode arrives in the setup payload. While recording,
//! each new device frame timestamp becomes one row of the trial table, and
//! the sync LEDs switch on and off at fixed recorded-frame counts.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::channels::{SetupParameters, SetupReceiver};
use crate::config::CameraSettings;
use crate::core::{SampleFrame, SensorKind};
use crate::error::{AppResult, DaqError};
use crate::hardware::{CameraDevice, SyncLed};
use crate::signals::SignalSet;
use crate::storage::TrialPaths;
use crate::worker::AcquisitionSource;

/// Records video and logs the timestamp of every captured frame.
pub struct CameraSource<C: CameraDevice> {
    camera: C,
    leds: Vec<Box<dyn SyncLed>>,
    settings: CameraSettings,
    preview_on: bool,
    last_timestamp: Option<f64>,
    recorded_frames: usize,
    leds_on: bool,
}

impl<C: CameraDevice> CameraSource<C> {
    /// Source over `camera`, pulsing every LED in `leds`.
    pub fn new(camera: C, leds: Vec<Box<dyn SyncLed>>, settings: CameraSettings) -> Self {
        Self {
            camera,
            leds,
            settings,
            preview_on: false,
            last_timestamp: None,
            recorded_frames: 0,
            leds_on: false,
        }
    }

    /// Whether the live preview is showing.
    pub fn preview_on(&self) -> bool {
        self.preview_on
    }

    fn set_leds(&mut self, on: bool) {
        for led in &mut self.leds {
            if let Err(e) = led.set(on) {
                warn!(error = %e, "sync LED switch failed");
            }
        }
        self.leds_on = on;
    }
}

impl<C: CameraDevice> AcquisitionSource for CameraSource<C> {
    fn kind(&self) -> SensorKind {
        SensorKind::Camera
    }

    fn initialize(&mut self) -> AppResult<()> {
        self.camera.open()
    }

    fn waits_for_setup(&self) -> bool {
        true
    }

    fn receive_setup(&mut self, setup: &SetupReceiver) -> AppResult<SetupParameters> {
        let (mode, params) = setup.receive_camera()?;
        self.camera.configure(mode)?;
        info!(%mode, "camera configured");
        Ok(params)
    }

    /// Each observed `preview` request flips the preview window.
    fn service_signals(&mut self, signals: &SignalSet) -> AppResult<()> {
        if !signals.preview.is_set() {
            return Ok(());
        }
        signals.preview.clear();
        if self.preview_on {
            self.camera.stop_preview()?;
        } else {
            self.camera.start_preview(self.settings.preview_window)?;
        }
        self.preview_on = !self.preview_on;
        debug!(preview_on = self.preview_on, "preview toggled");
        Ok(())
    }

    fn acquire(&mut self) -> AppResult<Option<SampleFrame>> {
        std::thread::sleep(Duration::from_millis(self.settings.poll_interval_ms));
        if !self.camera.is_recording() {
            return Ok(None);
        }
        let Some(timestamp) = self.camera.latest_frame_timestamp() else {
            return Ok(None);
        };
        if self.last_timestamp == Some(timestamp) {
            return Ok(None);
        }
        self.last_timestamp = Some(timestamp);
        self.recorded_frames += 1;

        if self.recorded_frames == self.settings.led_on_frame {
            self.set_leds(true);
        } else if self.recorded_frames == self.settings.led_off_frame {
            self.set_leds(false);
        }
        Ok(Some(SampleFrame::timestamp_only(timestamp)))
    }

    fn begin_trial(&mut self, paths: &TrialPaths) -> AppResult<()> {
        let video = paths
            .video
            .as_deref()
            .ok_or_else(|| DaqError::file_io(&paths.table, "no video path for camera trial"))?;
        self.recorded_frames = 0;
        self.last_timestamp = None;
        self.camera.start_recording(video)?;
        info!(video = %video.display(), "camera recording");
        Ok(())
    }

    fn end_trial(&mut self) -> AppResult<()> {
        if self.leds_on {
            self.set_leds(false);
        }
        if self.camera.is_recording() {
            self.camera.stop_recording()?;
        }
        debug!(frames = self.recorded_frames, "camera recording stopped");
        Ok(())
    }

    fn shutdown(&mut self) -> AppResult<()> {
        if self.camera.is_recording() {
            self.camera.stop_recording()?;
        }
        if self.preview_on {
            self.camera.stop_preview()?;
            self.preview_on = false;
        }
        self.camera.close()
    }
}
