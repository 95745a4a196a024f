//! Scheduling side of a worker: one dedicated OS thread per source.

use std::thread::{self, JoinHandle};
use tracing::info;

use super::{AcquisitionSource, AcquisitionWorker};
use crate::core::SensorKind;
use crate::error::{AppResult, DaqError};
use crate::signals::Signal;

/// Owner of a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    kind: SensorKind,
    alive: Signal,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Start `worker` on its own thread.
    pub fn spawn<S>(worker: AcquisitionWorker<S>) -> AppResult<Self>
    where
        S: AcquisitionSource + 'static,
    {
        let kind = worker.kind();
        let alive = worker.alive();
        let thread = thread::Builder::new()
            .name(format!("{}-worker", kind))
            .spawn(move || worker.run())?;
        info!(worker = %kind, "worker spawned");
        Ok(Self {
            kind,
            alive,
            thread: Some(thread),
        })
    }

    /// Sensor the worker drives.
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Withdraw liveness. The loop exits at its next iteration.
    pub fn request_stop(&self) {
        self.alive.clear();
    }

    /// True once the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Request a stop and wait for the thread. A panic inside the worker
    /// becomes [`DaqError::WorkerPanicked`].
    pub fn join(mut self) -> AppResult<()> {
        self.request_stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| DaqError::WorkerPanicked(self.kind.to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.alive.clear();
    }
}
