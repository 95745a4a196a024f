//! Per-trial buffering, file naming and writers with clean feature flag handling.
//!
//! A worker appends frames to its [`TrialBuffer`] while a trial runs and hands
//! the buffered rows to a [`TrialSink`] once the trial stops. File names come
//! from [`TrialPaths::new`]:
//!
//! ```text
//! {folder}/{experiment}_{participant}_{tag}_{trial}[_{repeat}].{ext}
//! ```

use std::path::{Path, PathBuf};

use crate::channels::SetupParameters;
use crate::core::{SampleFrame, SensorKind};
use crate::error::{AppResult, DaqError};

// ============================================================================
// Trial buffer
// ============================================================================

/// Fixed-capacity row store for one trial.
#[derive(Debug)]
pub struct TrialBuffer {
    rows: Vec<SampleFrame>,
    capacity: usize,
}

impl TrialBuffer {
    /// Preallocate room for `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append at the cursor. Fails once the buffer is full; existing rows are kept.
    pub fn push(&mut self, frame: SampleFrame) -> AppResult<()> {
        if self.rows.len() >= self.capacity {
            return Err(DaqError::BufferExhausted {
                capacity: self.capacity,
            });
        }
        self.rows.push(frame);
        Ok(())
    }

    /// Rows written so far, in arrival order.
    pub fn rows(&self) -> &[SampleFrame] {
        &self.rows
    }

    /// Write cursor.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when nothing was written since the last reset.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Maximum rows per trial.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reset the cursor to zero, keeping the allocation.
    pub fn reset(&mut self) {
        self.rows.clear();
    }
}

// ============================================================================
// Trial numbering
// ============================================================================

/// Index pair identifying one trial file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialId {
    /// Primary trial index. `-1` names re-takes recorded before any primary trial.
    pub trial: i64,
    /// Re-take number, present only for repeats.
    pub repeat: Option<u32>,
}

impl TrialId {
    fn suffix(&self) -> String {
        match self.repeat {
            Some(repeat) => format!("{}_{}", self.trial, repeat),
            None => self.trial.to_string(),
        }
    }
}

/// Primary/repeat counters of one worker.
#[derive(Debug, Clone)]
pub struct TrialCounter {
    trial: i64,
    repeat: u32,
}

impl Default for TrialCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TrialCounter {
    /// Counters before any trial.
    pub fn new() -> Self {
        Self {
            trial: -1,
            repeat: 0,
        }
    }

    /// Allocate the id of the next file: a re-take of the current trial when
    /// `repeat` is set, otherwise the next primary trial.
    pub fn next(&mut self, repeat: bool) -> TrialId {
        if repeat {
            self.repeat += 1;
            return TrialId {
                trial: self.trial,
                repeat: Some(self.repeat),
            };
        }
        self.trial += 1;
        self.repeat = 0;
        TrialId {
            trial: self.trial,
            repeat: None,
        }
    }
}

// ============================================================================
// File naming
// ============================================================================

/// Files produced by one worker for one trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialPaths {
    /// The timestamp/value table.
    pub table: PathBuf,
    /// Raw video stream (camera only).
    pub video: Option<PathBuf>,
}

impl TrialPaths {
    /// Derive the paths for `kind` and `id` under the session's folder.
    pub fn new(params: &SetupParameters, kind: SensorKind, id: TrialId) -> Self {
        let stem = format!(
            "{}_{}_{}_{}",
            params.experiment_id,
            params.participant_id,
            kind.file_tag(),
            id.suffix()
        );
        let table = params
            .folder
            .join(format!("{}.{}", stem, kind.table_extension()));
        let video = match kind {
            SensorKind::Camera => Some(params.folder.join(format!("{}.h264", stem))),
            _ => None,
        };
        Self { table, video }
    }
}

/// Make sure `folder` exists, creating it when `create` is set.
pub fn ensure_folder(folder: &Path, create: bool) -> AppResult<()> {
    if folder.is_dir() {
        return Ok(());
    }
    if !create {
        return Err(DaqError::file_io(folder, "output folder does not exist"));
    }
    std::fs::create_dir_all(folder).map_err(|e| DaqError::file_io(folder, e))
}

// ============================================================================
// CSV Writer
// ============================================================================

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;

    type TableWriter = csv::Writer<Box<dyn Write + Send>>;

    /// An open trial table. The header is on disk once `create` returns.
    pub struct TrialSink {
        path: PathBuf,
        channel_count: usize,
        writer: Option<TableWriter>,
    }

    impl TrialSink {
        /// Create the file and write its header row. An existing file is
        /// never overwritten.
        pub fn create(path: &Path, kind: SensorKind) -> AppResult<Self> {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .map_err(|e| DaqError::file_io(path, e))?;
            let sink = Self::from_writer(path, kind, Box::new(file))?;
            tracing::debug!(path = %path.display(), "trial file created");
            Ok(sink)
        }

        pub(crate) fn from_writer(
            path: &Path,
            kind: SensorKind,
            out: Box<dyn Write + Send>,
        ) -> AppResult<Self> {
            let mut writer = csv::Writer::from_writer(out);
            writer
                .write_record(kind.csv_header())
                .and_then(|_| writer.flush().map_err(csv::Error::from))
                .map_err(|e| DaqError::file_io(path, e))?;
            Ok(Self {
                path: path.to_path_buf(),
                channel_count: kind.channel_count(),
                writer: Some(writer),
            })
        }

        /// Path of the table.
        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Append `rows` in order.
        pub fn write_rows(&mut self, rows: &[SampleFrame]) -> AppResult<()> {
            let writer = self
                .writer
                .as_mut()
                .ok_or_else(|| DaqError::file_io(&self.path, "file already closed"))?;
            for frame in rows {
                writer
                    .write_record(frame.to_record(self.channel_count))
                    .map_err(|e| DaqError::file_io(&self.path, e))?;
            }
            Ok(())
        }

        /// Flush and close. Closing twice is a no-op.
        pub fn close(&mut self) -> AppResult<()> {
            if let Some(mut writer) = self.writer.take() {
                writer
                    .flush()
                    .map_err(|e| DaqError::file_io(&self.path, e))?;
                tracing::debug!(path = %self.path.display(), "trial file closed");
            }
            Ok(())
        }

        /// Close and delete a table that never received a trial.
        pub fn discard(mut self) -> AppResult<()> {
            drop(self.writer.take());
            std::fs::remove_file(&self.path).map_err(|e| DaqError::file_io(&self.path, e))?;
            tracing::debug!(path = %self.path.display(), "trial file discarded");
            Ok(())
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;

    /// Placeholder when the `storage_csv` feature is off.
    pub struct TrialSink;

    impl TrialSink {
        /// Always fails: table output is compiled out.
        pub fn create(_path: &Path, _kind: SensorKind) -> AppResult<Self> {
            Err(DaqError::FeatureNotEnabled("storage_csv".to_string()))
        }

        /// Unreachable without a sink.
        pub fn path(&self) -> &Path {
            Path::new("")
        }

        /// Unreachable without a sink.
        pub fn write_rows(&mut self, _rows: &[SampleFrame]) -> AppResult<()> {
            Err(DaqError::FeatureNotEnabled("storage_csv".to_string()))
        }

        /// No-op.
        pub fn close(&mut self) -> AppResult<()> {
            Ok(())
        }

        /// No-op.
        pub fn discard(self) -> AppResult<()> {
            Ok(())
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::TrialSink;
#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::TrialSink;

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SetupParameters {
        SetupParameters::new("E1", "P1", "/d")
    }

    #[test]
    fn test_primary_and_repeat_paths() {
        let primary = TrialPaths::new(
            &params(),
            SensorKind::ForceTorque,
            TrialId {
                trial: 3,
                repeat: None,
            },
        );
        assert_eq!(primary.table, PathBuf::from("/d/E1_P1_ft_3.csv"));
        assert_eq!(primary.video, None);

        let repeat = TrialPaths::new(
            &params(),
            SensorKind::ForceTorque,
            TrialId {
                trial: 3,
                repeat: Some(1),
            },
        );
        assert_eq!(repeat.table, PathBuf::from("/d/E1_P1_ft_3_1.csv"));
    }

    #[test]
    fn test_camera_paths_pair_table_and_video() {
        let paths = TrialPaths::new(
            &params(),
            SensorKind::Camera,
            TrialId {
                trial: 0,
                repeat: None,
            },
        );
        assert_eq!(paths.table, PathBuf::from("/d/E1_P1_Camera_0.txt"));
        assert_eq!(paths.video, Some(PathBuf::from("/d/E1_P1_Camera_0.h264")));
    }

    #[test]
    fn test_imu_extension() {
        let paths = TrialPaths::new(
            &params(),
            SensorKind::Inertial,
            TrialId {
                trial: 2,
                repeat: None,
            },
        );
        assert_eq!(paths.table, PathBuf::from("/d/E1_P1_IMU_2.csv"));
    }

    #[test]
    fn test_counter_sequence() {
        let mut counter = TrialCounter::new();
        assert_eq!(counter.next(false), TrialId { trial: 0, repeat: None });
        assert_eq!(counter.next(true), TrialId { trial: 0, repeat: Some(1) });
        assert_eq!(counter.next(true), TrialId { trial: 0, repeat: Some(2) });
        assert_eq!(counter.next(false), TrialId { trial: 1, repeat: None });
        assert_eq!(counter.next(true), TrialId { trial: 1, repeat: Some(1) });
    }

    #[test]
    fn test_repeat_before_any_trial_has_its_own_index() {
        let mut counter = TrialCounter::new();
        assert_eq!(counter.next(true), TrialId { trial: -1, repeat: Some(1) });
        assert_eq!(counter.next(false), TrialId { trial: 0, repeat: None });
        assert_eq!(counter.next(true), TrialId { trial: 0, repeat: Some(1) });
    }

    #[test]
    fn test_pre_trial_repeat_path() {
        let paths = TrialPaths::new(
            &params(),
            SensorKind::ForceTorque,
            TrialId {
                trial: -1,
                repeat: Some(1),
            },
        );
        assert_eq!(paths.table, PathBuf::from("/d/E1_P1_ft_-1_1.csv"));
    }

    #[test]
    fn test_buffer_capacity_contract() {
        let mut buffer = TrialBuffer::with_capacity(2);
        buffer.push(SampleFrame::invalid(0.0)).unwrap();
        buffer.push(SampleFrame::invalid(1.0)).unwrap();
        let err = buffer.push(SampleFrame::invalid(2.0)).unwrap_err();
        assert!(matches!(err, DaqError::BufferExhausted { capacity: 2 }));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.rows()[1].timestamp, 1.0);

        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    fn test_ensure_folder() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        assert!(ensure_folder(&nested, false).is_err());
        ensure_folder(&nested, true).unwrap();
        assert!(nested.is_dir());
    }

    #[cfg(feature = "storage_csv")]
    #[test]
    fn test_sink_writes_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("E1_P1_ft_0.csv");
        let mut sink = TrialSink::create(&path, SensorKind::ForceTorque).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Time,fx,fy,fz,tx,ty,tz\n"
        );

        sink.write_rows(&[
            SampleFrame::channels(1.5, [1.0, 2.0, 3.0, 0.5, 0.25, 0.0]),
            SampleFrame::invalid(2.5),
        ])
        .unwrap();
        sink.close().unwrap();
        sink.close().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1.5,1,2,3,0.5,0.25,0");
        assert_eq!(lines[2], "2.5,NaN,NaN,NaN,NaN,NaN,NaN");
    }

    #[cfg(feature = "storage_csv")]
    #[test]
    fn test_sink_create_fails_in_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("x.csv");
        let err = TrialSink::create(&path, SensorKind::Inertial).err().unwrap();
        assert!(matches!(err, DaqError::FileIo { .. }));
    }

    #[cfg(feature = "storage_csv")]
    #[test]
    fn test_sink_refuses_to_overwrite_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("E1_P1_ft_0.csv");
        std::fs::write(&path, "Time,fx,fy,fz,tx,ty,tz\n1,1,1,1,1,1,1\n").unwrap();

        let err = TrialSink::create(&path, SensorKind::ForceTorque).err().unwrap();
        assert!(matches!(err, DaqError::FileIo { .. }));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Time,fx,fy,fz,tx,ty,tz\n1,1,1,1,1,1,1\n"
        );
    }

    #[cfg(feature = "storage_csv")]
    #[test]
    fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("E1_P1_Camera_0.txt");
        let sink = TrialSink::create(&path, SensorKind::Camera).unwrap();
        sink.discard().unwrap();
        assert!(!path.exists());
    }
}
