//! The acquisition worker: one hardware source, one trial file lifecycle.
//!
//! ```text
//! Idle -> AwaitingSetup -> Armed -> Recording -> Flushing -> Armed ...
//!                 \__________\________\____________\--> Terminated
//! ```
//!
//! Every iteration of [`AcquisitionWorker::step`] polls the shared signals
//! without blocking, reads one sample from the source, publishes it to
//! telemetry, and appends it to the trial buffer while a trial is active.
//! What differs between sensors lives behind [`AcquisitionSource`].

mod handle;

pub use handle::WorkerHandle;

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::channels::{ErrorSender, FaultKind, SetupParameters, SetupReceiver, TelemetrySender};
use crate::config::StorageSettings;
use crate::core::{SampleFrame, SensorKind};
use crate::error::{AppResult, DaqError};
use crate::signals::{Signal, SignalSet};
use crate::storage::{ensure_folder, TrialBuffer, TrialCounter, TrialPaths, TrialSink};

/// How often a worker blocked on `setup-done` re-checks its liveness.
const SETUP_WAIT_SLICE: Duration = Duration::from_millis(100);

/// Sensor-specific behaviour plugged into an [`AcquisitionWorker`].
pub trait AcquisitionSource: Send {
    /// Which sensor this is.
    fn kind(&self) -> SensorKind;

    /// Bring the hardware up. An error here ends the worker before its loop.
    fn initialize(&mut self) -> AppResult<()>;

    /// Block on `setup-done` before entering the loop.
    fn waits_for_setup(&self) -> bool {
        false
    }

    /// Consume one setup payload and apply any device settings it carries.
    fn receive_setup(&mut self, setup: &SetupReceiver) -> AppResult<SetupParameters> {
        setup.receive_sensor()
    }

    /// Handle signals outside the trial lifecycle (bias, preview). Errors are
    /// reported; transport failures also end the worker.
    fn service_signals(&mut self, _signals: &SignalSet) -> AppResult<()> {
        Ok(())
    }

    /// Read one sample. `None` means nothing new this iteration.
    fn acquire(&mut self) -> AppResult<Option<SampleFrame>>;

    /// A trial file set was just opened.
    fn begin_trial(&mut self, _paths: &TrialPaths) -> AppResult<()> {
        Ok(())
    }

    /// The current trial is being flushed.
    fn end_trial(&mut self) -> AppResult<()> {
        Ok(())
    }

    /// Release the hardware.
    fn shutdown(&mut self) -> AppResult<()>;
}

impl AcquisitionSource for Box<dyn AcquisitionSource> {
    fn kind(&self) -> SensorKind {
        (**self).kind()
    }

    fn initialize(&mut self) -> AppResult<()> {
        (**self).initialize()
    }

    fn waits_for_setup(&self) -> bool {
        (**self).waits_for_setup()
    }

    fn receive_setup(&mut self, setup: &SetupReceiver) -> AppResult<SetupParameters> {
        (**self).receive_setup(setup)
    }

    fn service_signals(&mut self, signals: &SignalSet) -> AppResult<()> {
        (**self).service_signals(signals)
    }

    fn acquire(&mut self) -> AppResult<Option<SampleFrame>> {
        (**self).acquire()
    }

    fn begin_trial(&mut self, paths: &TrialPaths) -> AppResult<()> {
        (**self).begin_trial(paths)
    }

    fn end_trial(&mut self) -> AppResult<()> {
        (**self).end_trial()
    }

    fn shutdown(&mut self) -> AppResult<()> {
        (**self).shutdown()
    }
}

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, hardware not yet initialized.
    Idle,
    /// Hardware up, no setup consumed yet.
    AwaitingSetup,
    /// Ready for the next trial.
    Armed,
    /// Appending rows to the open trial.
    Recording,
    /// Writing the buffered trial to disk.
    Flushing,
    /// Loop exited; hardware released.
    Terminated,
}

/// One acquisition loop and its trial bookkeeping.
pub struct AcquisitionWorker<S: AcquisitionSource> {
    source: S,
    kind: SensorKind,
    signals: SignalSet,
    alive: Signal,
    setup: SetupReceiver,
    telemetry: TelemetrySender,
    errors: ErrorSender,
    storage: StorageSettings,

    state: WorkerState,
    params: Option<SetupParameters>,
    setup_seen: u64,
    stop_seen: u64,
    counter: TrialCounter,
    buffer: TrialBuffer,
    sink: Option<TrialSink>,
    file_closed: bool,
    // Set after a failed open or an overflow; cleared when `stop` is observed.
    suspended: bool,
}

impl<S: AcquisitionSource> AcquisitionWorker<S> {
    /// Wire a source to its channels and the shared signals.
    pub fn new(
        source: S,
        signals: SignalSet,
        setup: SetupReceiver,
        telemetry: TelemetrySender,
        errors: ErrorSender,
        storage: StorageSettings,
    ) -> Self {
        let kind = source.kind();
        let alive = Signal::new("alive");
        alive.set();
        let stop_seen = signals.stop.generation();
        Self {
            source,
            kind,
            signals,
            alive,
            setup,
            telemetry,
            errors,
            buffer: TrialBuffer::with_capacity(storage.buffer_capacity),
            storage,
            state: WorkerState::Idle,
            params: None,
            setup_seen: 0,
            stop_seen,
            counter: TrialCounter::new(),
            sink: None,
            file_closed: true,
            suspended: false,
        }
    }

    /// Sensor this worker drives.
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Liveness latch. Clearing it makes the loop exit at its next iteration.
    pub fn alive(&self) -> Signal {
        self.alive.clone()
    }

    /// Rows buffered for the current trial.
    pub fn buffered_rows(&self) -> usize {
        self.buffer.len()
    }

    fn is_alive(&self) -> bool {
        self.alive.is_set() && !self.signals.shutdown.is_set()
    }

    fn report(&self, err: &DaqError) {
        warn!(worker = %self.kind, error = %err, "worker fault");
        self.errors.report(self.kind, err);
    }

    /// Bring up the hardware and wait for setup if this source needs it.
    /// Returns `false` when the worker must not enter its loop.
    pub fn start(&mut self) -> bool {
        if let Err(e) = self.source.initialize() {
            error!(worker = %self.kind, error = %e, "hardware initialization failed");
            self.errors.report(self.kind, &e);
            self.release_hardware();
            return false;
        }
        self.state = WorkerState::AwaitingSetup;
        info!(worker = %self.kind, "hardware initialized");

        if self.source.waits_for_setup() {
            while !self.signals.setup_done.wait_timeout(SETUP_WAIT_SLICE) {
                if !self.is_alive() {
                    self.release_hardware();
                    return false;
                }
            }
        }
        true
    }

    /// Run the loop until liveness is withdrawn or a fatal fault occurs, then
    /// close any open file and release the hardware.
    pub fn run(mut self) {
        if !self.start() {
            return;
        }
        while self.step() {}
        self.terminate();
    }

    /// One loop iteration. Returns `false` when the loop must exit.
    pub fn step(&mut self) -> bool {
        if !self.is_alive() {
            return false;
        }

        self.consume_setup();

        if let Err(e) = self.source.service_signals(&self.signals) {
            self.report(&e);
            if FaultKind::of(&e) == FaultKind::Transport {
                return false;
            }
        }

        // A stop edge counts even if the controller already cleared it again.
        // Handled before the read so a fast restart never receives old rows.
        let stop_generation = self.signals.stop.generation();
        if self.signals.stop.is_set() || stop_generation != self.stop_seen {
            self.stop_seen = stop_generation;
            self.suspended = false;
            if !self.file_closed {
                self.flush_trial();
            }
        }

        if self.signals.trial_active() && self.sink.is_none() && !self.suspended {
            self.open_trial();
        }

        let frame = match self.source.acquire() {
            Ok(frame) => frame,
            Err(e) => {
                error!(worker = %self.kind, error = %e, "acquisition failed");
                self.errors.report(self.kind, &e);
                return false;
            }
        };

        if let Some(frame) = frame {
            self.telemetry.publish(frame);
            if self.sink.is_some() && self.signals.trial_active() {
                self.append(frame);
            }
        }
        true
    }

    /// Consume one setup payload per `setup-done` assertion. Only the first
    /// payload names files; later ones are applied to the device and dropped.
    fn consume_setup(&mut self) {
        if !self.signals.setup_done.is_set() {
            return;
        }
        let generation = self.signals.setup_done.generation();
        while self.setup_seen < generation {
            self.setup_seen += 1;
            match self.source.receive_setup(&self.setup) {
                Ok(params) if self.params.is_some() => {
                    debug!(
                        worker = %self.kind,
                        experiment = %params.experiment_id,
                        participant = %params.participant_id,
                        "repeated setup, file naming unchanged"
                    );
                }
                Ok(params) => {
                    info!(
                        worker = %self.kind,
                        experiment = %params.experiment_id,
                        participant = %params.participant_id,
                        folder = %params.folder.display(),
                        "setup received"
                    );
                    self.params = Some(params);
                    if self.state == WorkerState::AwaitingSetup {
                        self.state = WorkerState::Armed;
                    }
                }
                Err(e) => self.report(&e),
            }
        }
    }

    fn open_trial(&mut self) {
        let Some(params) = self.params.as_ref() else {
            // Controller guards prevent this; nothing to name the file with.
            debug!(worker = %self.kind, "recording asserted before setup, ignored");
            self.suspended = true;
            return;
        };

        let checkpoint = self.counter.clone();
        let id = self.counter.next(self.signals.repeat.is_set());
        let paths = TrialPaths::new(params, self.kind, id);

        let opened = ensure_folder(&params.folder, self.storage.create_folders)
            .and_then(|_| TrialSink::create(&paths.table, self.kind))
            .and_then(|sink| match self.source.begin_trial(&paths) {
                Ok(()) => Ok(sink),
                Err(e) => {
                    // No trial happened: drop the header-only table too.
                    if let Err(cleanup) = sink.discard() {
                        warn!(error = %cleanup, "could not remove unused trial file");
                    }
                    Err(e)
                }
            });

        match opened {
            Ok(sink) => {
                info!(worker = %self.kind, path = %paths.table.display(), "trial started");
                self.sink = Some(sink);
                self.file_closed = false;
                self.buffer.reset();
                self.state = WorkerState::Recording;
            }
            Err(e) => {
                self.report(&e);
                self.counter = checkpoint;
                self.suspended = true;
                self.state = WorkerState::Armed;
            }
        }
    }

    fn append(&mut self, frame: SampleFrame) {
        if let Err(e) = self.buffer.push(frame) {
            // Keep what fits, close the trial and ignore the rest of it.
            self.report(&e);
            self.flush_trial();
            self.suspended = true;
        }
    }

    fn flush_trial(&mut self) {
        self.state = WorkerState::Flushing;

        if let Err(e) = self.source.end_trial() {
            self.report(&e);
        }

        if let Some(mut sink) = self.sink.take() {
            let written = sink
                .write_rows(self.buffer.rows())
                .and_then(|_| sink.close());
            match written {
                Ok(()) => info!(
                    worker = %self.kind,
                    rows = self.buffer.len(),
                    path = %sink.path().display(),
                    "trial saved"
                ),
                Err(e) => self.report(&e),
            }
        }

        self.buffer.reset();
        self.file_closed = true;
        self.state = WorkerState::Armed;
    }

    fn release_hardware(&mut self) {
        if let Err(e) = self.source.shutdown() {
            warn!(worker = %self.kind, error = %e, "hardware release failed");
        }
        self.state = WorkerState::Terminated;
    }

    /// Close any open file and release the hardware.
    pub fn terminate(&mut self) {
        if !self.file_closed {
            self.flush_trial();
        }
        self.release_hardware();
        info!(worker = %self.kind, "worker terminated");
    }
}
