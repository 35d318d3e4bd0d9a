//! Tether Sync -- tolerance-based dirty tracking and delta replication.
//!
//! This crate holds the state that a host replicates to its clients and
//! records into snapshot logs: anchor-relative coordinate systems, the
//! mission-control panel, a scrolling text log, and a synchronized clock.
//! Each aggregate implements [`replicated::Replicated`] (full and delta wire
//! encodings) and, where it is part of a recording,
//! [`replicated::Loggable`].
//!
//! # Quick Start
//!
//! ```
//! use glam::Vec3;
//! use tether_sync::prelude::*;
//!
//! let config = SyncConfig::default();
//! let mut host = CoordinateSync::new(Role::Host, RigidTransform::IDENTITY, WorldPose::default(), &config);
//! let mut client = CoordinateSync::new(Role::Client, RigidTransform::IDENTITY, WorldPose::default(), &config);
//!
//! host.set_pose(WorldPose { position: Vec3::new(1.0, 0.0, 0.0), ..WorldPose::default() });
//! host.sync();
//! let delta = host.take_delta().unwrap();
//! client.decode_delta(&delta).unwrap();
//! client.sync();
//! assert_eq!(client.pose().position, Vec3::new(1.0, 0.0, 0.0));
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod codec;
pub mod config;
pub mod coordinate;
pub mod mission_state;
pub mod observer;
pub mod reconcile;
pub mod replicated;
pub mod scrolling_log;
pub mod transform;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while decoding wire payloads or log blobs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The input ended before a value could be read.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A string payload was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// A decoded value is outside the range its field allows.
    #[error("invalid value {value} for field '{field}'")]
    InvalidValue { field: &'static str, value: u64 },

    /// A complete message was decoded but bytes were left over.
    #[error("{remaining} trailing bytes after message")]
    TrailingBytes { remaining: usize },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::clock::{SyncedClock, TimeChanged};
    pub use crate::codec::{ByteReader, ByteWriter};
    pub use crate::config::{SendTolerances, SyncConfig};
    pub use crate::coordinate::{CoordinateSync, WorldPose};
    pub use crate::mission_state::{ControlState, LogSlotInfo, MissionControlState, StateChanged};
    pub use crate::observer::{ObserverId, Observers};
    pub use crate::reconcile::{ReconcileConfig, ReconcileOutcome, SnapPolicy, Smoothed};
    pub use crate::replicated::{
        Angle, Distance, Exact, Loggable, Replicated, ReplicatedField, Role, Tolerance,
    };
    pub use crate::scrolling_log::ScrollingLog;
    pub use crate::transform::{angle_between_degrees, RigidTransform};
    pub use crate::CodecError;
}
