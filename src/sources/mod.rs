//! The three acquisition sources plugged into [`AcquisitionWorker`](crate::worker::AcquisitionWorker).

pub mod camera;
pub mod force_torque;
pub mod inertial;

pub use camera::CameraSource;
pub use force_torque::ForceTorqueSource;
pub use inertial::InertialSource;
