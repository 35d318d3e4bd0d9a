//! Capabilities the mission director drives.
//!
//! Entities opt into each capability by implementing the trait and being
//! registered for it in the [`Registry`](crate::registry::Registry).

use tether_sync::coordinate::CoordinateSync;
use tether_sync::scrolling_log::ScrollingLog;

use crate::entity::TrackedItem;

/// Reacts to missions starting and debriefs beginning.
pub trait Steerable {
    /// A mission starts. `requires_reset` is `false` only for the initial
    /// free-play start, where entities keep their current state.
    fn start_mission(&mut self, requires_reset: bool);

    /// A recorded mission is about to be replayed.
    fn start_debrief(&mut self);
}

/// Follows the global pause flag.
pub trait Pausable {
    fn set_paused(&mut self, paused: bool);
}

/// Whether an entity wants the current mission to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FinishStatus {
    #[default]
    Continue,
    /// End the mission after a grace period, still recording.
    StopDelay,
    /// End the mission now.
    StopImmediate,
}

pub trait Finishable {
    fn finish_status(&self) -> FinishStatus;
}

/// Per-frame pose work: sampling on the host, reconciliation on a client.
pub trait FrameSync {
    fn sync_frame(&mut self);
}

impl FrameSync for CoordinateSync {
    fn sync_frame(&mut self) {
        self.sync();
    }
}

impl FrameSync for TrackedItem {
    fn sync_frame(&mut self) {
        self.update();
    }
}

/// The journal starts empty for every reset mission and every debrief.
impl Steerable for ScrollingLog {
    fn start_mission(&mut self, requires_reset: bool) {
        if requires_reset {
            self.clear();
        }
    }

    fn start_debrief(&mut self) {
        self.clear();
    }
}
