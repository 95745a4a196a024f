//! Force/torque source: the ATI driver plus bias handling.

use crate::adapters::LineTransport;
use crate::config::ForceTorqueSettings;
use crate::core::{unix_timestamp, SampleFrame, SensorKind};
use crate::error::AppResult;
use crate::instrument::AtiMini40;
use crate::signals::SignalSet;
use crate::worker::AcquisitionSource;

/// Streams frames from the force/torque sensor.
pub struct ForceTorqueSource<T: LineTransport> {
    sensor: AtiMini40<T>,
}

impl<T: LineTransport> ForceTorqueSource<T> {
    /// Source over `transport`.
    pub fn new(transport: T, settings: ForceTorqueSettings) -> Self {
        Self {
            sensor: AtiMini40::new(transport, settings),
        }
    }
}

impl<T: LineTransport> AcquisitionSource for ForceTorqueSource<T> {
    fn kind(&self) -> SensorKind {
        SensorKind::ForceTorque
    }

    fn initialize(&mut self) -> AppResult<()> {
        self.sensor.connect()
    }

    /// Re-bias on request, deferred while a trial is active.
    fn service_signals(&mut self, signals: &SignalSet) -> AppResult<()> {
        if !signals.bias_request.is_set() || signals.trial_active() {
            return Ok(());
        }
        let result = self.sensor.rebias();
        signals.bias_request.clear();
        result
    }

    fn acquire(&mut self) -> AppResult<Option<SampleFrame>> {
        let readings = self.sensor.read_frame()?;
        Ok(Some(SampleFrame {
            timestamp: unix_timestamp(),
            readings,
        }))
    }

    fn shutdown(&mut self) -> AppResult<()> {
        self.sensor.disconnect()
    }
}
