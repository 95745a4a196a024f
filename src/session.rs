//! Session assembly: channels, signals, three workers and their controller.

use std::time::Duration;
use tracing::{error, info};

use crate::adapters::{LineTransport, SerialAdapter, SimulatedForceTorque};
use crate::channels::{error_channel, setup_channel, telemetry_channel};
use crate::config::{DriverKind, Settings};
use crate::controller::{SetupSenders, TrialController};
use crate::error::{AppResult, DaqError};
use crate::hardware::{SimulatedCamera, SimulatedInertial, SimulatedLed, SyncLed};
use crate::signals::SignalSet;
use crate::sources::{CameraSource, ForceTorqueSource, InertialSource};
use crate::worker::{AcquisitionSource, AcquisitionWorker, WorkerHandle};

/// Frame period of the simulated force/torque sensor.
const SIMULATED_FT_PERIOD: Duration = Duration::from_millis(1);

/// The three sources of one session.
pub struct Sources {
    /// Force/torque source.
    pub force_torque: Box<dyn AcquisitionSource>,
    /// Inertial source.
    pub inertial: Box<dyn AcquisitionSource>,
    /// Camera source.
    pub camera: Box<dyn AcquisitionSource>,
}

impl Sources {
    /// Build the sources the settings ask for.
    pub fn from_settings(settings: &Settings) -> AppResult<Self> {
        let ft = &settings.force_torque;
        let transport: Box<dyn LineTransport> = match ft.driver {
            DriverKind::Serial => Box::new(
                SerialAdapter::new(ft.port.clone(), ft.baud_rate).with_timeout(ft.read_timeout()),
            ),
            DriverKind::Simulated => Box::new(SimulatedForceTorque::new(SIMULATED_FT_PERIOD)),
        };

        // Only simulated backends exist for these two; validation rejects anything else.
        if settings.inertial.driver != DriverKind::Simulated
            || settings.camera.driver != DriverKind::Simulated
        {
            return Err(DaqError::Configuration(
                "inertial and camera drivers must be 'simulated'".to_string(),
            ));
        }
        let leds: Vec<Box<dyn SyncLed>> =
            vec![Box::new(SimulatedLed::new()), Box::new(SimulatedLed::new())];

        Ok(Self {
            force_torque: Box::new(ForceTorqueSource::new(transport, ft.clone())),
            inertial: Box::new(InertialSource::new(SimulatedInertial::new(
                Duration::from_millis(settings.inertial.period_ms),
            ))),
            camera: Box::new(CameraSource::new(
                SimulatedCamera::new(),
                leds,
                settings.camera.clone(),
            )),
        })
    }
}

/// A running session.
pub struct Session {
    controller: TrialController,
    signals: SignalSet,
    workers: Vec<WorkerHandle>,
}

impl Session {
    /// Build the configured hardware and start every worker.
    pub fn start(settings: &Settings) -> AppResult<Self> {
        Self::with_sources(settings, Sources::from_settings(settings)?)
    }

    /// Start one worker per source.
    pub fn with_sources(settings: &Settings, sources: Sources) -> AppResult<Self> {
        let signals = SignalSet::new();
        let (errors_tx, errors_rx) = error_channel();
        let capacity = settings.telemetry.capacity;

        let (ft_setup_tx, ft_setup_rx) = setup_channel();
        let (imu_setup_tx, imu_setup_rx) = setup_channel();
        let (cam_setup_tx, cam_setup_rx) = setup_channel();
        let (ft_tel_tx, ft_tel_rx) = telemetry_channel(capacity);
        let (imu_tel_tx, imu_tel_rx) = telemetry_channel(capacity);
        // Camera rows are timestamps only; nobody displays them.
        let (cam_tel_tx, _cam_tel_rx) = telemetry_channel(1);

        let workers = vec![
            WorkerHandle::spawn(AcquisitionWorker::new(
                sources.force_torque,
                signals.clone(),
                ft_setup_rx,
                ft_tel_tx,
                errors_tx.clone(),
                settings.storage.clone(),
            ))?,
            WorkerHandle::spawn(AcquisitionWorker::new(
                sources.inertial,
                signals.clone(),
                imu_setup_rx,
                imu_tel_tx,
                errors_tx.clone(),
                settings.storage.clone(),
            ))?,
            WorkerHandle::spawn(AcquisitionWorker::new(
                sources.camera,
                signals.clone(),
                cam_setup_rx,
                cam_tel_tx,
                errors_tx,
                settings.storage.clone(),
            ))?,
        ];

        let controller = TrialController::new(
            signals.clone(),
            SetupSenders {
                force_torque: ft_setup_tx,
                inertial: imu_setup_tx,
                camera: cam_setup_tx,
            },
            ft_tel_rx,
            imu_tel_rx,
            errors_rx,
        );
        info!("session started with {} workers", workers.len());

        Ok(Self {
            controller,
            signals,
            workers,
        })
    }

    /// The operator control surface.
    pub fn controller(&self) -> &TrialController {
        &self.controller
    }

    /// True once every worker thread has exited.
    pub fn all_workers_finished(&self) -> bool {
        self.workers.iter().all(WorkerHandle::is_finished)
    }

    /// Signal shutdown, then join every worker. Open trial files are closed
    /// by their workers before they exit.
    pub fn shutdown(self) -> AppResult<()> {
        info!("shutting down session");
        self.signals.shutdown.set();

        let mut errors = Vec::new();
        for worker in self.workers {
            let kind = worker.kind();
            if let Err(e) = worker.join() {
                error!(worker = %kind, error = %e, "worker did not shut down cleanly");
                errors.push(e);
            }
        }

        if errors.is_empty() {
            info!("session shut down");
            Ok(())
        } else {
            Err(DaqError::ShutdownFailed(errors))
        }
    }
}
