//! Channels between the controller and the workers.
//!
//! Three kinds, all built on `crossbeam-channel`:
//!
//! - **setup**: one per worker, controller -> worker. Carries a fixed ordered
//!   sequence of [`SetupValue`]s that the worker consumes in that same order.
//! - **telemetry**: one per worker, worker -> display. Bounded; the producer
//!   never waits (a full channel drops the sample) and the reader drains
//!   everything pending and keeps the newest sample.
//! - **errors**: shared, workers -> controller. Carries [`ErrorReport`]s.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{SampleFrame, SensorKind};
use crate::error::{AppResult, DaqError};

// =============================================================================
// Setup channel
// =============================================================================

/// Identifying strings of a session, shared by every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupParameters {
    /// Participant / subject identifier.
    pub participant_id: String,
    /// Experiment identifier.
    pub experiment_id: String,
    /// Output folder for every trial file.
    pub folder: PathBuf,
}

impl SetupParameters {
    /// Convenience constructor.
    pub fn new(
        experiment_id: impl Into<String>,
        participant_id: impl Into<String>,
        folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            experiment_id: experiment_id.into(),
            folder: folder.into(),
        }
    }
}

/// Capture resolution and frame rate of the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraMode {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub frame_rate: u32,
}

impl CameraMode {
    /// The modes offered to the operator.
    pub const PRESETS: [CameraMode; 2] = [
        CameraMode {
            width: 1280,
            height: 720,
            frame_rate: 60,
        },
        CameraMode {
            width: 1920,
            height: 1080,
            frame_rate: 30,
        },
    ];
}

impl Default for CameraMode {
    fn default() -> Self {
        Self::PRESETS[0]
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}/{}fps", self.width, self.height, self.frame_rate)
    }
}

impl FromStr for CameraMode {
    type Err = DaqError;

    /// Parses `"WIDTHxHEIGHT/FPSfps"`, e.g. `"1920x1080/30fps"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DaqError::Configuration(format!("Invalid camera mode '{}'", s));

        let (resolution, rate) = s.trim().split_once('/').ok_or_else(invalid)?;
        let (width, height) = resolution.split_once('x').ok_or_else(invalid)?;
        let rate = rate.strip_suffix("fps").unwrap_or(rate);

        let mode = CameraMode {
            width: width.trim().parse().map_err(|_| invalid())?,
            height: height.trim().parse().map_err(|_| invalid())?,
            frame_rate: rate.trim().parse().map_err(|_| invalid())?,
        };
        if mode.width == 0 || mode.height == 0 || mode.frame_rate == 0 {
            return Err(invalid());
        }
        Ok(mode)
    }
}

/// One element of the setup sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupValue {
    /// Camera frame rate.
    FrameRate(u32),
    /// Camera resolution `(width, height)`.
    Resolution(u32, u32),
    /// Identifier or folder.
    Text(String),
}

/// Controller side of a setup channel.
#[derive(Clone, Debug)]
pub struct SetupSender {
    tx: Sender<SetupValue>,
}

/// Worker side of a setup channel.
#[derive(Debug)]
pub struct SetupReceiver {
    rx: Receiver<SetupValue>,
    timeout: Duration,
}

/// Bound on how long a worker waits for a value once `setup-done` is observed.
const SETUP_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Create a setup channel.
pub fn setup_channel() -> (SetupSender, SetupReceiver) {
    let (tx, rx) = unbounded();
    (
        SetupSender { tx },
        SetupReceiver {
            rx,
            timeout: SETUP_RECV_TIMEOUT,
        },
    )
}

impl SetupSender {
    fn push(&self, value: SetupValue) -> AppResult<()> {
        self.tx
            .send(value)
            .map_err(|_| DaqError::SetupProtocol("worker setup channel closed".to_string()))
    }

    /// Sensor payload: participant, experiment, folder.
    pub fn publish_sensor(&self, params: &SetupParameters) -> AppResult<()> {
        self.push(SetupValue::Text(params.participant_id.clone()))?;
        self.push(SetupValue::Text(params.experiment_id.clone()))?;
        self.push(SetupValue::Text(params.folder.to_string_lossy().into_owned()))
    }

    /// Camera payload: frame rate, resolution, participant, experiment, folder.
    pub fn publish_camera(&self, mode: &CameraMode, params: &SetupParameters) -> AppResult<()> {
        self.push(SetupValue::FrameRate(mode.frame_rate))?;
        self.push(SetupValue::Resolution(mode.width, mode.height))?;
        self.publish_sensor(params)
    }
}

impl SetupReceiver {
    fn next(&self, expected: &str) -> AppResult<SetupValue> {
        self.rx.recv_timeout(self.timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => {
                DaqError::SetupProtocol(format!("timed out waiting for {}", expected))
            }
            RecvTimeoutError::Disconnected => {
                DaqError::SetupProtocol(format!("channel closed before {}", expected))
            }
        })
    }

    fn next_text(&self, expected: &str) -> AppResult<String> {
        match self.next(expected)? {
            SetupValue::Text(text) => Ok(text),
            other => Err(DaqError::SetupProtocol(format!(
                "expected {}, got {:?}",
                expected, other
            ))),
        }
    }

    /// Consume a sensor payload.
    pub fn receive_sensor(&self) -> AppResult<SetupParameters> {
        let participant_id = self.next_text("participant id")?;
        let experiment_id = self.next_text("experiment id")?;
        let folder = self.next_text("folder")?;
        Ok(SetupParameters {
            participant_id,
            experiment_id,
            folder: PathBuf::from(folder),
        })
    }

    /// Consume a camera payload.
    pub fn receive_camera(&self) -> AppResult<(CameraMode, SetupParameters)> {
        let frame_rate = match self.next("frame rate")? {
            SetupValue::FrameRate(rate) => rate,
            other => {
                return Err(DaqError::SetupProtocol(format!(
                    "expected frame rate, got {:?}",
                    other
                )))
            }
        };
        let (width, height) = match self.next("resolution")? {
            SetupValue::Resolution(w, h) => (w, h),
            other => {
                return Err(DaqError::SetupProtocol(format!(
                    "expected resolution, got {:?}",
                    other
                )))
            }
        };
        let params = self.receive_sensor()?;
        Ok((
            CameraMode {
                width,
                height,
                frame_rate,
            },
            params,
        ))
    }
}

// =============================================================================
// Telemetry channel
// =============================================================================

/// Worker side of a telemetry channel. Publishing never blocks.
#[derive(Clone, Debug)]
pub struct TelemetrySender {
    tx: Sender<SampleFrame>,
    dropped: Arc<AtomicU64>,
}

/// Display side of a telemetry channel.
#[derive(Clone, Debug)]
pub struct TelemetryReader {
    rx: Receiver<SampleFrame>,
    dropped: Arc<AtomicU64>,
}

/// Create a telemetry channel holding at most `capacity` pending samples.
pub fn telemetry_channel(capacity: usize) -> (TelemetrySender, TelemetryReader) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        TelemetrySender {
            tx,
            dropped: dropped.clone(),
        },
        TelemetryReader { rx, dropped },
    )
}

impl TelemetrySender {
    /// Best-effort send. Returns `false` when the sample was dropped.
    pub fn publish(&self, frame: SampleFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

impl TelemetryReader {
    /// Drain every pending sample and return the newest one.
    pub fn latest(&self) -> Option<SampleFrame> {
        self.rx.try_iter().last()
    }

    /// Samples dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Error channel
// =============================================================================

/// Category of a worker failure as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// Hardware link could not be opened or dropped. The worker has exited.
    Transport,
    /// The sensor did not acknowledge a command.
    AckTimeout,
    /// A trial outgrew its buffer and was cut short.
    BufferExhausted,
    /// A trial file could not be opened, written or closed.
    FileIo,
    /// The setup sequence was malformed or incomplete.
    SetupProtocol,
    /// Anything else.
    Internal,
}

impl FaultKind {
    /// Classify an error.
    pub fn of(err: &DaqError) -> Self {
        match err {
            DaqError::Transport(_) | DaqError::SerialPortNotConnected => FaultKind::Transport,
            DaqError::AckTimeout(_) => FaultKind::AckTimeout,
            DaqError::BufferExhausted { .. } => FaultKind::BufferExhausted,
            DaqError::FileIo { .. } | DaqError::Io(_) => FaultKind::FileIo,
            #[cfg(feature = "storage_csv")]
            DaqError::Csv(_) => FaultKind::FileIo,
            DaqError::SetupProtocol(_) => FaultKind::SetupProtocol,
            _ => FaultKind::Internal,
        }
    }
}

/// A failure description sent from a worker to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Reporting worker.
    pub source: SensorKind,
    /// Category.
    pub kind: FaultKind,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}: {}", self.source, self.kind, self.message)
    }
}

/// Worker side of the shared error channel.
#[derive(Clone, Debug)]
pub struct ErrorSender {
    tx: Sender<ErrorReport>,
}

/// Controller side of the shared error channel.
#[derive(Clone, Debug)]
pub struct ErrorReceiver {
    rx: Receiver<ErrorReport>,
}

/// Create the error channel.
pub fn error_channel() -> (ErrorSender, ErrorReceiver) {
    let (tx, rx) = unbounded();
    (ErrorSender { tx }, ErrorReceiver { rx })
}

impl ErrorSender {
    /// Report `err` on behalf of `source`.
    pub fn report(&self, source: SensorKind, err: &DaqError) {
        let report = ErrorReport {
            source,
            kind: FaultKind::of(err),
            message: err.to_string(),
        };
        if self.tx.send(report).is_err() {
            tracing::warn!(worker = %source, error = %err, "error channel closed, report lost");
        }
    }
}

impl ErrorReceiver {
    /// Every pending report, oldest first.
    pub fn drain(&self) -> Vec<ErrorReport> {
        self.rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next report.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ErrorReport> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_mode_presets_parse() {
        assert_eq!(
            "1280x720/60fps".parse::<CameraMode>().unwrap(),
            CameraMode::PRESETS[0]
        );
        assert_eq!(
            "1920x1080/30fps".parse::<CameraMode>().unwrap(),
            CameraMode::PRESETS[1]
        );
    }

    #[test]
    fn test_camera_mode_rejects_garbage() {
        assert!("1280/60fps".parse::<CameraMode>().is_err());
        assert!("1280x720".parse::<CameraMode>().is_err());
        assert!("0x720/60fps".parse::<CameraMode>().is_err());
    }

    #[test]
    fn test_camera_mode_display_round_trips() {
        let mode = CameraMode::PRESETS[1];
        assert_eq!(mode.to_string().parse::<CameraMode>().unwrap(), mode);
    }

    #[test]
    fn test_sensor_setup_order() {
        let (tx, rx) = setup_channel();
        let params = SetupParameters::new("E1", "P1", "/d");
        tx.publish_sensor(&params).unwrap();
        assert_eq!(rx.receive_sensor().unwrap(), params);
    }

    #[test]
    fn test_camera_setup_order() {
        let (tx, rx) = setup_channel();
        let params = SetupParameters::new("E1", "P1", "/d");
        let mode = CameraMode::PRESETS[1];
        tx.publish_camera(&mode, &params).unwrap();
        let (got_mode, got_params) = rx.receive_camera().unwrap();
        assert_eq!(got_mode, mode);
        assert_eq!(got_params, params);
    }

    #[test]
    fn test_camera_receiver_rejects_sensor_payload() {
        let (tx, rx) = setup_channel();
        tx.publish_sensor(&SetupParameters::new("E1", "P1", "/d"))
            .unwrap();
        let err = rx.receive_camera().unwrap_err();
        assert!(matches!(err, DaqError::SetupProtocol(_)));
    }

    #[test]
    fn test_missing_setup_times_out() {
        let (_tx, rx) = setup_channel();
        assert!(matches!(
            rx.receive_sensor(),
            Err(DaqError::SetupProtocol(_))
        ));
    }

    #[test]
    fn test_telemetry_latest_value_wins() {
        let (tx, rx) = telemetry_channel(16);
        for i in 0..5 {
            assert!(tx.publish(SampleFrame::channels(i as f64, [i as f64; 6])));
        }
        assert_eq!(rx.latest().unwrap().timestamp, 4.0);
        assert!(rx.latest().is_none());
    }

    #[test]
    fn test_telemetry_full_channel_drops_without_blocking() {
        let (tx, rx) = telemetry_channel(2);
        assert!(tx.publish(SampleFrame::invalid(0.0)));
        assert!(tx.publish(SampleFrame::invalid(1.0)));
        assert!(!tx.publish(SampleFrame::invalid(2.0)));
        assert_eq!(rx.dropped(), 1);
        assert_eq!(rx.latest().unwrap().timestamp, 1.0);
    }

    #[test]
    fn test_error_reports_are_classified() {
        let (tx, rx) = error_channel();
        tx.report(SensorKind::ForceTorque, &DaqError::Transport("gone".into()));
        tx.report(
            SensorKind::Inertial,
            &DaqError::BufferExhausted { capacity: 3 },
        );
        let reports = rx.drain();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].kind, FaultKind::Transport);
        assert_eq!(reports[0].source, SensorKind::ForceTorque);
        assert_eq!(reports[1].kind, FaultKind::BufferExhausted);
    }
}
