//! Inertial source: orientation and linear acceleration.

use crate::core::{unix_timestamp, SampleFrame, SensorKind};
use crate::error::AppResult;
use crate::hardware::InertialSensor;
use crate::worker::AcquisitionSource;

/// Polls an [`InertialSensor`] once per iteration.
pub struct InertialSource<D: InertialSensor> {
    device: D,
}

impl<D: InertialSensor> InertialSource<D> {
    /// Source over `device`.
    pub fn new(device: D) -> Self {
        Self { device }
    }
}

impl<D: InertialSensor> AcquisitionSource for InertialSource<D> {
    fn kind(&self) -> SensorKind {
        SensorKind::Inertial
    }

    fn initialize(&mut self) -> AppResult<()> {
        self.device.open()
    }

    fn acquire(&mut self) -> AppResult<Option<SampleFrame>> {
        let channels = self.device.read()?;
        let timestamp = unix_timestamp();
        // One missing channel invalidates the whole frame.
        let frame = match channels.iter().copied().collect::<Option<Vec<f64>>>() {
            Some(values) => {
                let mut out = [0.0; 6];
                out.copy_from_slice(&values);
                SampleFrame::channels(timestamp, out)
            }
            None => SampleFrame::invalid(timestamp),
        };
        Ok(Some(frame))
    }

    fn shutdown(&mut self) -> AppResult<()> {
        self.device.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedInertial;
    use std::time::Duration;

    #[test]
    fn test_partial_reading_becomes_invalid_frame() {
        let device = SimulatedInertial::new(Duration::ZERO).with_dropouts(2);
        let mut source = InertialSource::new(device);
        source.initialize().unwrap();

        let first = source.acquire().unwrap().unwrap();
        assert!(first.readings.values().is_some());
        let second = source.acquire().unwrap().unwrap();
        assert!(second.readings.is_invalid());
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut source = InertialSource::new(SimulatedInertial::new(Duration::ZERO));
        assert!(source.acquire().is_err());
    }
}
