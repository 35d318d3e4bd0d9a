//! The snapshot log: periodic full-state captures and scrub playback.
//!
//! # States
//!
//! ```text
//! Idle --start_logging--> Recording --stop_logging--> Idle
//! Idle --show_logging_state--> Idle   (read-only)
//! ```
//!
//! While recording, [`SnapshotLog::update`] accumulates frame time and
//! captures a [`LogPoint`] whenever a full interval has passed. The
//! accumulator starts primed with `interval - lead_in`, so the first capture
//! happens shortly after logging begins rather than a whole interval later.
//!
//! # File layout
//!
//! All integers little-endian:
//!
//! ```text
//! i32 point_count
//! repeat point_count times:
//!     i32 state_len
//!     f32 timestamp
//!     [u8; state_len] state
//! ```

use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use tether_sync::codec::{ByteReader, ByteWriter};
use tether_sync::replicated::Loggable;
use tether_sync::CodecError;
use tracing::{debug, info, warn};

use crate::LogError;

/// Default seconds between captures.
pub const DEFAULT_INTERVAL: f32 = 1.0;
/// Default delay before the first capture.
pub const DEFAULT_LEAD_IN: f32 = 0.2;

// ---------------------------------------------------------------------------
// LogPoint
// ---------------------------------------------------------------------------

/// One captured snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LogPoint {
    /// Seconds of recorded mission time since the first point.
    pub timestamp: f32,
    /// Concatenated state of every loggable entity, in registration order.
    pub state: Vec<u8>,
}

// ---------------------------------------------------------------------------
// SnapshotLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SnapshotLog {
    interval: f32,
    lead_in: f32,
    points: Vec<LogPoint>,
    recording: bool,
    accumulated: f32,
}

impl Default for SnapshotLog {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_LEAD_IN)
    }
}

impl SnapshotLog {
    /// # Panics
    ///
    /// Panics unless `interval` is positive and finite and
    /// `0 <= lead_in < interval`.
    pub fn new(interval: f32, lead_in: f32) -> Self {
        assert!(
            interval > 0.0 && interval.is_finite(),
            "logging interval must be positive and finite, got {interval}"
        );
        assert!(
            (0.0..interval).contains(&lead_in),
            "lead-in {lead_in} must lie in [0, {interval})"
        );
        Self {
            interval,
            lead_in,
            points: Vec::new(),
            recording: false,
            accumulated: 0.0,
        }
    }

    pub fn interval(&self) -> f32 {
        self.interval
    }

    pub fn lead_in(&self) -> f32 {
        self.lead_in
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn points(&self) -> &[LogPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Timestamp of the last point, or zero for an empty log.
    pub fn duration(&self) -> f32 {
        self.points.last().map_or(0.0, |p| p.timestamp)
    }

    // -- recording ----------------------------------------------------------

    /// Discard any previous points and begin recording.
    ///
    /// # Panics
    ///
    /// Panics if already recording.
    pub fn start_logging(&mut self) {
        assert!(!self.recording, "start_logging called while already recording");
        self.points.clear();
        self.accumulated = self.interval - self.lead_in;
        self.recording = true;
        info!(interval = self.interval, lead_in = self.lead_in, "snapshot logging started");
    }

    /// Freeze the log. If nothing was captured yet, for instance when the
    /// mission ended inside the lead-in, `entities` is captured once at
    /// timestamp zero so a stopped log is never empty.
    ///
    /// # Panics
    ///
    /// Panics if not recording.
    pub fn stop_logging(&mut self, entities: &dyn Loggable) {
        assert!(self.recording, "stop_logging called while not recording");
        if self.points.is_empty() {
            self.capture(0.0, entities);
        }
        self.recording = false;
        info!(points = self.points.len(), duration = self.duration(), "snapshot logging stopped");
    }

    /// Advance recorded time by `dt` and capture `entities` if an interval
    /// has elapsed. Does nothing while idle.
    ///
    /// Returns `true` when a point was captured.
    pub fn update(&mut self, dt: f32, entities: &dyn Loggable) -> bool {
        if !self.recording {
            return false;
        }
        self.accumulated += dt;
        if self.accumulated < self.interval {
            return false;
        }

        let timestamp = match self.points.last() {
            Some(last) => last.timestamp + self.accumulated,
            None => 0.0,
        };
        self.capture(timestamp, entities);
        self.accumulated = 0.0;
        true
    }

    fn capture(&mut self, timestamp: f32, entities: &dyn Loggable) {
        let mut writer = ByteWriter::new();
        entities.write_state(&mut writer);
        let state = writer.into_bytes();
        debug!(index = self.points.len(), timestamp, bytes = state.len(), "captured snapshot");
        self.points.push(LogPoint { timestamp, state });
    }

    // -- playback -----------------------------------------------------------

    /// Index of the last point at or before normalized time `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t` is outside `[0, 1)`.
    pub fn point_index_at(&self, t: f32) -> Result<usize, LogError> {
        assert!((0.0..1.0).contains(&t), "scrub position {t} outside [0, 1)");
        let last = self.points.last().ok_or(LogError::EmptyLog)?;
        let target = t * last.timestamp;
        let after = self.points.partition_point(|p| p.timestamp <= target);
        Ok(after.saturating_sub(1))
    }

    /// Restore `entities` to the snapshot at normalized time `t` and return
    /// the index of the point that was replayed. The log itself is not
    /// modified.
    ///
    /// # Panics
    ///
    /// Panics while recording or if `t` is outside `[0, 1)`.
    pub fn show_logging_state(&self, t: f32, entities: &mut dyn Loggable) -> Result<usize, LogError> {
        assert!(!self.recording, "show_logging_state called while recording");
        let index = self.point_index_at(t)?;
        let point = &self.points[index];
        let mut reader = ByteReader::new(&point.state);
        entities.read_state(&mut reader)?;
        if !reader.is_exhausted() {
            warn!(
                index,
                trailing = reader.remaining(),
                "snapshot has more state than the registered entities consumed"
            );
        }
        Ok(index)
    }

    // -- persistence --------------------------------------------------------

    /// Serialize every point in the file layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body: usize = self.points.iter().map(|p| 8 + p.state.len()).sum();
        let mut writer = ByteWriter::with_capacity(4 + body);
        writer.write_i32(self.points.len() as i32);
        for point in &self.points {
            writer.write_i32(point.state.len() as i32);
            writer.write_f32(point.timestamp);
            writer.write_bytes(&point.state);
        }
        writer.into_bytes()
    }

    /// BLAKE3 hex digest of [`to_bytes`](Self::to_bytes).
    pub fn digest(&self) -> String {
        blake3::hash(&self.to_bytes()).to_hex().to_string()
    }

    /// Replace the in-memory points with those parsed from `bytes`.
    ///
    /// The log is left untouched if parsing fails.
    ///
    /// # Panics
    ///
    /// Panics while recording.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), LogError> {
        assert!(!self.recording, "cannot load a log while recording");
        self.points = parse_points(bytes)?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), LogError> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(&mut self, mut reader: R) -> Result<(), LogError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.load_bytes(&bytes)
    }

    /// Write the log to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), LogError> {
        let file = fs::File::create(path)?;
        self.write_to(BufWriter::new(file))?;
        info!(path = %path.display(), points = self.points.len(), "snapshot log saved");
        Ok(())
    }

    /// Replace the in-memory points with the contents of `path`.
    pub fn load(&mut self, path: &Path) -> Result<(), LogError> {
        let bytes = fs::read(path)?;
        self.load_bytes(&bytes)?;
        info!(path = %path.display(), points = self.points.len(), "snapshot log loaded");
        Ok(())
    }

    /// Read a log from `path` with default timing.
    pub fn from_file(path: &Path) -> Result<Self, LogError> {
        let mut log = Self::default();
        log.load(path)?;
        Ok(log)
    }
}

fn malformed(reason: impl Into<String>) -> LogError {
    LogError::Malformed {
        reason: reason.into(),
    }
}

fn truncated(what: &str) -> impl FnOnce(CodecError) -> LogError + '_ {
    move |err| malformed(format!("truncated {what}: {err}"))
}

fn parse_points(bytes: &[u8]) -> Result<Vec<LogPoint>, LogError> {
    let mut reader = ByteReader::new(bytes);
    let count = reader.read_i32().map_err(truncated("point count"))?;
    let count = usize::try_from(count).map_err(|_| malformed(format!("negative point count {count}")))?;

    // Each point needs at least eight header bytes.
    let mut points = Vec::with_capacity(count.min(reader.remaining() / 8));
    for index in 0..count {
        let len = reader.read_i32().map_err(truncated("point header"))?;
        let len = usize::try_from(len)
            .map_err(|_| malformed(format!("point {index} has negative length {len}")))?;
        let timestamp = reader.read_f32().map_err(truncated("point header"))?;
        let state = reader.read_bytes(len).map_err(truncated("point state"))?;

        if let Some(previous) = points.last().map(|p: &LogPoint| p.timestamp) {
            if !(timestamp > previous) {
                return Err(malformed(format!(
                    "point {index} timestamp {timestamp} does not follow {previous}"
                )));
            }
        }
        points.push(LogPoint {
            timestamp,
            state: state.to_vec(),
        });
    }

    if !reader.is_exhausted() {
        return Err(malformed(format!("{} bytes after the last point", reader.remaining())));
    }
    Ok(points)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// A single integer that logs as four bytes.
    #[derive(Debug, Default)]
    struct Counter(i32);

    impl Loggable for Counter {
        fn write_state(&self, writer: &mut ByteWriter) {
            writer.write_i32(self.0);
        }

        fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
            self.0 = reader.read_i32()?;
            Ok(())
        }
    }

    fn recorded(values: &[i32]) -> SnapshotLog {
        let mut log = SnapshotLog::new(1.0, 0.2);
        log.start_logging();
        let mut counter = Counter(0);
        for &value in values {
            counter.0 = value;
            // Exactly one capture per call.
            assert!(log.update(1.0, &counter));
        }
        log.stop_logging(&counter);
        log
    }

    #[test]
    fn first_capture_after_lead_in() {
        let mut log = SnapshotLog::new(1.0, 0.2);
        log.start_logging();
        let counter = Counter(1);
        assert!(!log.update(0.15, &counter));
        assert!(log.update(0.1, &counter));
        assert_eq!(log.points()[0].timestamp, 0.0);

        assert!(!log.update(0.5, &counter));
        assert!(log.update(0.5, &counter));
        assert_eq!(log.points()[1].timestamp, 1.0);
    }

    #[test]
    fn update_while_idle_is_ignored() {
        let mut log = SnapshotLog::default();
        assert!(!log.update(5.0, &Counter(0)));
        assert!(log.is_empty());
    }

    #[test]
    fn timestamps_accumulate_late_frames() {
        let mut log = SnapshotLog::new(1.0, 0.0);
        log.start_logging();
        let c = Counter(0);
        assert!(log.update(1.0, &c));
        assert!(log.update(1.5, &c));
        assert_eq!(log.points()[1].timestamp, 1.5);
    }

    #[test]
    fn scrub_selects_floor_point() {
        let log = recorded(&[10, 20, 30, 40]);
        // Timestamps 0, 1, 2, 3.
        let mut c = Counter::default();
        assert_eq!(log.show_logging_state(0.0, &mut c).unwrap(), 0);
        assert_eq!(c.0, 10);
        assert_eq!(log.show_logging_state(0.66, &mut c).unwrap(), 1);
        assert_eq!(c.0, 20);
        assert_eq!(log.show_logging_state(2.0 / 3.0 + 1e-4, &mut c).unwrap(), 2);
        assert_eq!(log.show_logging_state(0.999, &mut c).unwrap(), 2);
        assert_eq!(c.0, 30);
    }

    #[test]
    fn stop_inside_lead_in_keeps_one_point() {
        let mut log = SnapshotLog::new(1.0, 0.2);
        log.start_logging();
        let counter = Counter(9);
        assert!(!log.update(1.0 / 60.0, &counter));
        log.stop_logging(&counter);
        assert_eq!(log.len(), 1);
        assert_eq!(log.points()[0].timestamp, 0.0);

        let mut c = Counter::default();
        assert_eq!(log.show_logging_state(0.0, &mut c).unwrap(), 0);
        assert_eq!(log.show_logging_state(0.5, &mut c).unwrap(), 0);
        assert_eq!(c.0, 9);
    }

    #[test]
    fn stop_after_captures_adds_nothing() {
        let mut log = SnapshotLog::new(1.0, 1.0);
        log.start_logging();
        let counter = Counter(1);
        assert!(log.update(0.5, &counter));
        assert!(!log.update(0.5, &counter));
        log.stop_logging(&Counter(2));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn scrub_never_recorded_log_is_error() {
        let log = SnapshotLog::default();
        assert!(matches!(
            log.show_logging_state(0.5, &mut Counter::default()),
            Err(LogError::EmptyLog)
        ));
    }

    #[test]
    fn single_point_always_selected() {
        let log = recorded(&[7]);
        let mut c = Counter::default();
        assert_eq!(log.show_logging_state(0.9, &mut c).unwrap(), 0);
        assert_eq!(c.0, 7);
    }

    #[test]
    fn bytes_round_trip() {
        let log = recorded(&[1, 2, 3]);
        let mut loaded = SnapshotLog::default();
        loaded.load_bytes(&log.to_bytes()).unwrap();
        assert_eq!(loaded.points(), log.points());
        assert_eq!(loaded.digest(), log.digest());
    }

    #[test]
    fn layout_is_count_then_len_time_bytes() {
        let bytes = recorded(&[5]).to_bytes();
        assert_eq!(&bytes[0..4], &1i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &4i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &0f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &5i32.to_le_bytes());
        assert_eq!(bytes.len(), 16);
    }

    #[test]
    fn truncated_file_is_malformed_and_log_kept() {
        let mut log = recorded(&[1, 2]);
        let mut bytes = log.to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(log.load_bytes(&bytes), Err(LogError::Malformed { .. })));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn negative_count_is_malformed() {
        let mut log = SnapshotLog::default();
        let err = log.load_bytes(&(-3i32).to_le_bytes()).unwrap_err();
        assert!(err.to_string().contains("negative point count"));
    }

    #[test]
    fn repeated_timestamp_is_malformed() {
        let mut w = ByteWriter::new();
        w.write_i32(2);
        for _ in 0..2 {
            w.write_i32(0);
            w.write_f32(1.0);
        }
        let mut log = SnapshotLog::default();
        assert!(matches!(
            log.load_bytes(&w.into_bytes()),
            Err(LogError::Malformed { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "already recording")]
    fn double_start_panics() {
        let mut log = SnapshotLog::default();
        log.start_logging();
        log.start_logging();
    }

    #[test]
    #[should_panic(expected = "not recording")]
    fn stop_while_idle_panics() {
        SnapshotLog::default().stop_logging(&Counter::default());
    }

    #[test]
    #[should_panic(expected = "while recording")]
    fn scrub_while_recording_panics() {
        let mut log = SnapshotLog::default();
        log.start_logging();
        let _ = log.show_logging_state(0.0, &mut Counter::default());
    }

    #[test]
    #[should_panic(expected = "outside [0, 1)")]
    fn scrub_at_one_panics() {
        let log = recorded(&[1]);
        let _ = log.show_logging_state(1.0, &mut Counter::default());
    }
}
