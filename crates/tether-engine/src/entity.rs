//! A movable scene item: pose replication plus mission hooks.

use tether_sync::codec::{ByteReader, ByteWriter};
use tether_sync::config::SyncConfig;
use tether_sync::coordinate::{CoordinateSync, WorldPose};
use tether_sync::replicated::{Loggable, Replicated, Role};
use tether_sync::transform::RigidTransform;
use tether_sync::CodecError;

use crate::capability::{Pausable, Steerable};

/// An item that trainees can move around.
///
/// It returns to its start pose whenever a mission is reset and when a debrief
/// begins. While a debrief replays or the mission is paused it is frozen:
/// [`TrackedItem::move_to`] is ignored.
#[derive(Debug, Clone)]
pub struct TrackedItem {
    sync: CoordinateSync,
    start_pose: WorldPose,
    mission_running: bool,
    frozen: bool,
}

impl TrackedItem {
    pub fn new(role: Role, anchor: RigidTransform, start_pose: WorldPose, config: &SyncConfig) -> Self {
        Self {
            sync: CoordinateSync::new(role, anchor, start_pose, config),
            start_pose,
            mission_running: false,
            frozen: false,
        }
    }

    pub fn sync(&self) -> &CoordinateSync {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut CoordinateSync {
        &mut self.sync
    }

    pub fn pose(&self) -> &WorldPose {
        self.sync.pose()
    }

    pub fn is_mission_running(&self) -> bool {
        self.mission_running
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Host: move the item, unless it is frozen. Returns whether it moved.
    pub fn move_to(&mut self, pose: WorldPose) -> bool {
        if self.frozen {
            return false;
        }
        self.sync.set_pose(pose);
        true
    }

    /// Per-frame pose sampling (host) or reconciliation (client).
    pub fn update(&mut self) {
        self.sync.sync();
    }
}

impl Steerable for TrackedItem {
    fn start_mission(&mut self, requires_reset: bool) {
        self.mission_running = true;
        self.frozen = false;
        if requires_reset && self.sync.role().is_host() {
            self.sync.set_pose(self.start_pose);
        }
    }

    fn start_debrief(&mut self) {
        self.mission_running = false;
        self.frozen = true;
        if self.sync.role().is_host() {
            self.sync.set_pose(self.start_pose);
        }
    }
}

impl Pausable for TrackedItem {
    fn set_paused(&mut self, paused: bool) {
        // A debrief keeps the item frozen regardless of pause.
        if self.mission_running {
            self.frozen = paused;
        }
    }
}

impl Replicated for TrackedItem {
    fn is_dirty(&self) -> bool {
        self.sync.is_dirty()
    }

    fn write_full(&self, writer: &mut ByteWriter) {
        self.sync.write_full(writer);
    }

    fn write_delta(&self, writer: &mut ByteWriter) {
        self.sync.write_delta(writer);
    }

    fn read_full(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        self.sync.read_full(reader)
    }

    fn read_delta(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        self.sync.read_delta(reader)
    }

    fn reset_dirty(&mut self) {
        self.sync.reset_dirty();
    }

    fn take_full(&mut self) -> Vec<u8> {
        self.sync.take_full()
    }
}

impl Loggable for TrackedItem {
    fn write_state(&self, writer: &mut ByteWriter) {
        self.sync.write_state(writer);
    }

    fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        self.sync.read_state(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn item() -> TrackedItem {
        let start = WorldPose {
            position: Vec3::new(0.0, 1.0, 0.0),
            ..WorldPose::default()
        };
        TrackedItem::new(Role::Host, RigidTransform::IDENTITY, start, &SyncConfig::default())
    }

    fn moved() -> WorldPose {
        WorldPose {
            position: Vec3::new(2.0, 1.0, 0.0),
            ..WorldPose::default()
        }
    }

    #[test]
    fn reset_mission_returns_to_start() {
        let mut item = item();
        item.start_mission(false);
        assert!(item.move_to(moved()));
        item.start_mission(true);
        assert_eq!(item.pose().position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn pause_freezes_only_during_mission() {
        let mut item = item();
        item.set_paused(true);
        assert!(!item.is_frozen());
        item.start_mission(true);
        item.set_paused(true);
        assert!(!item.move_to(moved()));
        item.set_paused(false);
        assert!(item.move_to(moved()));
    }

    #[test]
    fn debrief_freezes_at_start_pose() {
        let mut item = item();
        item.start_mission(true);
        item.move_to(moved());
        item.start_debrief();
        assert!(item.is_frozen());
        assert_eq!(item.pose().position, Vec3::new(0.0, 1.0, 0.0));
        item.set_paused(false);
        assert!(!item.move_to(moved()));
    }

    #[test]
    fn movement_is_replicated_after_update() {
        let mut item = item();
        item.start_mission(false);
        item.move_to(moved());
        item.update();
        let delta = item.take_delta().unwrap();
        let mut client = TrackedItem::new(
            Role::Client,
            RigidTransform::IDENTITY,
            WorldPose::default(),
            &SyncConfig::default(),
        );
        client.decode_delta(&delta).unwrap();
        client.update();
        assert_eq!(client.pose().position, Vec3::new(2.0, 1.0, 0.0));
    }
}
