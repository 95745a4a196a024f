//! Operator-facing control surface.
//!
//! The controller is the only writer of the trial signals apart from the
//! camera's preview acknowledgement and the sensor's bias acknowledgement. It
//! publishes setup payloads, guards start/stop, and reads the newest telemetry
//! and any error reports for display.

use tracing::info;

use crate::channels::{
    CameraMode, ErrorReceiver, ErrorReport, SetupParameters, SetupSender, TelemetryReader,
};
use crate::core::SampleFrame;
use crate::error::{AppResult, DaqError};
use crate::signals::SignalSet;

/// Setup channels of the three workers.
#[derive(Clone, Debug)]
pub struct SetupSenders {
    /// Force/torque worker.
    pub force_torque: SetupSender,
    /// Inertial worker.
    pub inertial: SetupSender,
    /// Camera worker.
    pub camera: SetupSender,
}

/// Status snapshot for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialStatus {
    /// Setup was saved.
    pub setup_done: bool,
    /// A trial is being recorded.
    pub trial_active: bool,
    /// The next trial file is a re-take.
    pub repeat: bool,
    /// A bias request is still pending.
    pub bias_pending: bool,
}

/// Drives the trial state machine on behalf of the operator.
pub struct TrialController {
    signals: SignalSet,
    setup: SetupSenders,
    force_torque: TelemetryReader,
    inertial: TelemetryReader,
    errors: ErrorReceiver,
}

impl TrialController {
    /// Controller over the given signals and channel ends.
    pub fn new(
        signals: SignalSet,
        setup: SetupSenders,
        force_torque: TelemetryReader,
        inertial: TelemetryReader,
        errors: ErrorReceiver,
    ) -> Self {
        Self {
            signals,
            setup,
            force_torque,
            inertial,
            errors,
        }
    }

    /// Shared signals, for observers.
    pub fn signals(&self) -> &SignalSet {
        &self.signals
    }

    /// Validate and publish a setup to every worker, then assert `setup-done`.
    /// Saving again re-applies the camera mode; workers keep naming files
    /// after the first setup they received.
    pub fn save_setup(&self, params: &SetupParameters, mode: CameraMode) -> AppResult<()> {
        if params.participant_id.trim().is_empty() {
            return Err(DaqError::Configuration("No participant ID entered".to_string()));
        }
        if params.folder.as_os_str().is_empty() {
            return Err(DaqError::Configuration("No folder selected".to_string()));
        }
        if params.experiment_id.trim().is_empty() {
            return Err(DaqError::Configuration("No experiment ID entered".to_string()));
        }

        // Re-asserting bumps the generation so every worker consumes the new payload.
        self.signals.setup_done.clear();
        self.setup.camera.publish_camera(&mode, params)?;
        self.setup.force_torque.publish_sensor(params)?;
        self.setup.inertial.publish_sensor(params)?;
        self.signals.setup_done.set();

        info!(
            experiment = %params.experiment_id,
            participant = %params.participant_id,
            folder = %params.folder.display(),
            %mode,
            "setup saved"
        );
        Ok(())
    }

    /// Begin a trial. Requires a saved setup.
    pub fn start_trial(&self) -> AppResult<()> {
        if !self.signals.setup_done.is_set() {
            return Err(DaqError::Configuration(
                "Setup has not been registered correctly".to_string(),
            ));
        }
        self.signals.stop.clear();
        self.signals.recording.set();
        info!(repeat = self.signals.repeat.is_set(), "trial started");
        Ok(())
    }

    /// End the current trial. Requires a started trial; repeating it is harmless.
    pub fn stop_trial(&self) -> AppResult<()> {
        if !self.signals.recording.is_set() {
            return Err(DaqError::Configuration("Trial has not been started".to_string()));
        }
        self.signals.stop.set();
        info!("trial stopped");
        Ok(())
    }

    /// Ask the force/torque worker to re-bias; deferred while a trial is active.
    pub fn request_bias(&self) {
        self.signals.bias_request.set();
    }

    /// Flip the camera preview.
    pub fn toggle_preview(&self) {
        self.signals.preview.set();
    }

    /// Record the following trials as re-takes (or not).
    pub fn set_repeat(&self, repeat: bool) {
        if repeat {
            self.signals.repeat.set();
        } else {
            self.signals.repeat.clear();
        }
    }

    /// Newest force/torque sample since the last call.
    pub fn latest_force_torque(&self) -> Option<SampleFrame> {
        self.force_torque.latest()
    }

    /// Newest inertial sample since the last call.
    pub fn latest_inertial(&self) -> Option<SampleFrame> {
        self.inertial.latest()
    }

    /// Every pending worker fault, oldest first.
    pub fn drain_errors(&self) -> Vec<ErrorReport> {
        self.errors.drain()
    }

    /// Current signal states.
    pub fn status(&self) -> TrialStatus {
        TrialStatus {
            setup_done: self.signals.setup_done.is_set(),
            trial_active: self.signals.trial_active(),
            repeat: self.signals.repeat.is_set(),
            bias_pending: self.signals.bias_request.is_set(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{error_channel, setup_channel, telemetry_channel, SetupReceiver};

    struct Rig {
        controller: TrialController,
        ft_setup: SetupReceiver,
        camera_setup: SetupReceiver,
        _imu_setup: SetupReceiver,
    }

    fn rig() -> Rig {
        let (ft_tx, ft_rx) = setup_channel();
        let (imu_tx, imu_rx) = setup_channel();
        let (cam_tx, cam_rx) = setup_channel();
        let (_ft_tel_tx, ft_tel_rx) = telemetry_channel(4);
        let (_imu_tel_tx, imu_tel_rx) = telemetry_channel(4);
        let (_err_tx, err_rx) = error_channel();
        let controller = TrialController::new(
            SignalSet::new(),
            SetupSenders {
                force_torque: ft_tx,
                inertial: imu_tx,
                camera: cam_tx,
            },
            ft_tel_rx,
            imu_tel_rx,
            err_rx,
        );
        Rig {
            controller,
            ft_setup: ft_rx,
            camera_setup: cam_rx,
            _imu_setup: imu_rx,
        }
    }

    #[test]
    fn test_setup_rejects_missing_fields() {
        let rig = rig();
        for params in [
            SetupParameters::new("E1", "", "/d"),
            SetupParameters::new("", "P1", "/d"),
            SetupParameters::new("E1", "P1", ""),
        ] {
            let err = rig
                .controller
                .save_setup(&params, CameraMode::default())
                .unwrap_err();
            assert!(matches!(err, DaqError::Configuration(_)));
        }
        assert!(!rig.controller.signals().setup_done.is_set());
    }

    #[test]
    fn test_setup_publishes_to_every_worker() {
        let rig = rig();
        let params = SetupParameters::new("E1", "P1", "/d");
        rig.controller
            .save_setup(&params, CameraMode::PRESETS[1])
            .unwrap();

        assert!(rig.controller.signals().setup_done.is_set());
        assert_eq!(rig.ft_setup.receive_sensor().unwrap(), params);
        let (mode, camera_params) = rig.camera_setup.receive_camera().unwrap();
        assert_eq!(mode, CameraMode::PRESETS[1]);
        assert_eq!(camera_params, params);
    }

    #[test]
    fn test_resaving_setup_bumps_generation() {
        let rig = rig();
        let params = SetupParameters::new("E1", "P1", "/d");
        rig.controller.save_setup(&params, CameraMode::default()).unwrap();
        rig.controller.save_setup(&params, CameraMode::default()).unwrap();
        assert_eq!(rig.controller.signals().setup_done.generation(), 2);
    }

    #[test]
    fn test_start_requires_setup() {
        let rig = rig();
        assert!(rig.controller.start_trial().is_err());
        assert!(rig.controller.stop_trial().is_err());

        rig.controller
            .save_setup(&SetupParameters::new("E1", "P1", "/d"), CameraMode::default())
            .unwrap();
        rig.controller.start_trial().unwrap();
        assert!(rig.controller.status().trial_active);

        rig.controller.stop_trial().unwrap();
        rig.controller.stop_trial().unwrap();
        assert!(!rig.controller.status().trial_active);
        assert_eq!(rig.controller.signals().stop.generation(), 1);
    }

    #[test]
    fn test_repeat_and_bias_flags() {
        let rig = rig();
        rig.controller.set_repeat(true);
        rig.controller.request_bias();
        let status = rig.controller.status();
        assert!(status.repeat);
        assert!(status.bias_pending);

        rig.controller.set_repeat(false);
        assert!(!rig.controller.status().repeat);
    }
}
