//! Saved logs on disk, listed as debrief slots.
//!
//! Every log is stored as `<ticks>.log`, where `ticks` counts 100 ns
//! intervals since the UNIX epoch at save time. Names therefore sort by
//! capture time, and the date shown for a slot is derived from the name
//! alone (UTC).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tether_sync::mission_state::{LogSlotInfo, MAX_LOG_SLOTS};
use tracing::{debug, info, warn};

use crate::snapshot_log::SnapshotLog;
use crate::LogError;

/// Slots kept by [`LogDirectory::scan`]; older logs are not listed.
pub const MAX_SLOTS: usize = MAX_LOG_SLOTS;

const TICKS_PER_SECOND: u64 = 10_000_000;
const EXTENSION: &str = "log";

/// A directory of saved snapshot logs.
#[derive(Debug, Clone)]
pub struct LogDirectory {
    root: PathBuf,
    last_ticks: u64,
}

impl LogDirectory {
    /// Use `root` as the save directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LogError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let last_ticks = list_ticks(&root)?.last().map_or(0, |(ticks, _)| *ticks);
        debug!(root = %root.display(), last_ticks, "log directory opened");
        Ok(Self { root, last_ticks })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save `log` under a name derived from the current time.
    pub fn save(&mut self, log: &SnapshotLog) -> Result<PathBuf, LogError> {
        self.save_at(log, SystemTime::now())
    }

    /// Save `log` as if captured at `time`.
    ///
    /// The name is bumped past every earlier save so it stays unique and
    /// ordered even if the wall clock steps backwards.
    pub fn save_at(&mut self, log: &SnapshotLog, time: SystemTime) -> Result<PathBuf, LogError> {
        let ticks = ticks_since_epoch(time).max(self.last_ticks + 1);
        let path = self.root.join(format!("{ticks}.{EXTENSION}"));
        log.save(&path)?;
        self.last_ticks = ticks;
        Ok(path)
    }

    /// List saved logs, oldest first, keeping at most [`MAX_SLOTS`] of the
    /// newest.
    pub fn scan(&self) -> Result<Vec<LogSlotInfo>, LogError> {
        let mut entries = list_ticks(&self.root)?;
        if entries.len() > MAX_SLOTS {
            let dropped = entries.len() - MAX_SLOTS;
            warn!(dropped, "more saved logs than debrief slots; listing the newest");
            entries.drain(..dropped);
        }
        let slots: Vec<LogSlotInfo> = entries
            .into_iter()
            .map(|(ticks, path)| LogSlotInfo {
                path: Some(path),
                ..slot_from_ticks(ticks)
            })
            .collect();
        info!(slots = slots.len(), root = %self.root.display(), "scanned log directory");
        Ok(slots)
    }

    /// Load the log behind `slots[slot]`.
    pub fn load_slot(&self, slots: &[LogSlotInfo], slot: u8) -> Result<SnapshotLog, LogError> {
        SnapshotLog::from_file(slot_path(slots, slot)?)
    }
}

/// File behind `slots[slot]`.
pub fn slot_path(slots: &[LogSlotInfo], slot: u8) -> Result<&Path, LogError> {
    slots
        .get(usize::from(slot))
        .and_then(|info| info.path.as_deref())
        .ok_or(LogError::MissingSlot {
            slot,
            available: slots.len(),
        })
}

/// 100 ns ticks since the UNIX epoch; times before the epoch map to zero.
pub fn ticks_since_epoch(time: SystemTime) -> u64 {
    let elapsed = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    elapsed.as_secs() * TICKS_PER_SECOND + u64::from(elapsed.subsec_nanos() / 100)
}

/// UTC date and time of a tick count, with no path.
pub fn slot_from_ticks(ticks: u64) -> LogSlotInfo {
    let seconds = ticks / TICKS_PER_SECOND;
    let days = (seconds / 86_400) as i64;
    let second_of_day = seconds % 86_400;
    let (year, month, day) = civil_from_days(days);
    LogSlotInfo {
        path: None,
        year: (year - 2000).clamp(0, i64::from(u8::MAX)) as u8,
        month: month as u8,
        day: day as u8,
        hour: (second_of_day / 3600) as u8,
        minute: (second_of_day % 3600 / 60) as u8,
    }
}

/// Proleptic Gregorian date for a day count since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// `(ticks, path)` for every `<ticks>.log` under `root`, sorted by ticks.
fn list_ticks(root: &Path) -> Result<Vec<(u64, PathBuf)>, LogError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        match path.file_stem().and_then(|s| s.to_str()).map(str::parse::<u64>) {
            Some(Ok(ticks)) => entries.push((ticks, path)),
            _ => {
                let err = LogError::BadFileName { path };
                warn!(error = %err, "skipping file in log directory");
            }
        }
    }
    entries.sort_unstable_by_key(|(ticks, _)| *ticks);
    Ok(entries)
}
