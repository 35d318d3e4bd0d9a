//! Tether Log -- time-indexed snapshot recording and scrubbing.
//!
//! A [`snapshot_log::SnapshotLog`] captures the full serialized state of
//! every loggable entity at a fixed interval while a mission runs. After the
//! mission it can be persisted, reloaded, and scrubbed: any normalized
//! playback time selects the closest earlier snapshot, which is replayed
//! into the same entities.
//!
//! [`directory::LogDirectory`] names saved logs by capture time and lists
//! them as debrief slots.
//!
//! # Quick Start
//!
//! ```
//! use tether_log::prelude::*;
//! use tether_sync::prelude::*;
//!
//! let mut clock = SyncedClock::new(Role::Host);
//! clock.start(8, 0);
//!
//! let mut log = SnapshotLog::new(1.0, 0.2);
//! log.start_logging();
//! for _ in 0..30 {
//!     clock.advance(0.1);
//!     log.update(0.1, &clock);
//! }
//! log.stop_logging(&clock);
//! assert_eq!(log.len(), 3);
//!
//! let index = log.show_logging_state(0.0, &mut clock).unwrap();
//! assert_eq!(index, 0);
//! ```

#![deny(unsafe_code)]

pub mod directory;
pub mod snapshot_log;

use std::path::PathBuf;

use tether_sync::CodecError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by snapshot log persistence and playback.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Reading or writing a log file failed.
    #[error("log file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A stored snapshot could not be restored into the entities.
    #[error("failed to restore snapshot: {0}")]
    Codec(#[from] CodecError),

    /// A persisted log does not follow the on-disk layout.
    #[error("malformed log file: {reason}")]
    Malformed { reason: String },

    /// Scrubbing was requested on a log with no points, which only happens
    /// for a log that was never recorded.
    #[error("cannot scrub an empty log")]
    EmptyLog,

    /// The requested debrief slot does not exist or has no file.
    #[error("no log in slot {slot} ({available} slots available)")]
    MissingSlot { slot: u8, available: usize },

    /// A file in the log directory does not carry a tick-count name.
    #[error("unrecognised log file name: {path}")]
    BadFileName { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::directory::{slot_from_ticks, slot_path, ticks_since_epoch, LogDirectory, MAX_SLOTS};
    pub use crate::snapshot_log::{LogPoint, SnapshotLog};
    pub use crate::LogError;
}
