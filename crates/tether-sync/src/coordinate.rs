//! Replication of a coordinate system relative to a shared anchor.
//!
//! [`CoordinateSync`] tracks one entity's pose. Values are stored in
//! *anchor-local* coordinates, so the same encoded payload means the same
//! thing to every participant even though each one calibrated its anchor
//! independently.
//!
//! On the host, [`CoordinateSync::sync`] converts the sampled world pose into
//! anchor space and marks each of orientation, position and scale dirty when
//! it moves beyond the send tolerance. On a client, `sync` converts the
//! received anchor-space values back to world space and reconciles the
//! displayed pose toward them.
//!
//! # Wire layout
//!
//! - Full: `quat orientation, vec3 position, vec3 scale`.
//! - Delta: `u16 header`, then the fields whose bit is set, in the order
//!   orientation (`0x1`), position (`0x2`), scale (`0x4`). The reserved bit
//!   `0x8000` requests a full rewrite: all three fields follow regardless of
//!   the per-field bits.

use glam::{Quat, Vec3};

use crate::codec::{ByteReader, ByteWriter};
use crate::config::SyncConfig;
use crate::reconcile::ReconcileConfig;
use crate::replicated::{Angle, Distance, Loggable, Replicated, ReplicatedField, Role};
use crate::transform::RigidTransform;
use crate::CodecError;

/// Orientation changed.
pub const ORIENTATION_BIT: u16 = 0x1;
/// Position changed.
pub const POSITION_BIT: u16 = 0x2;
/// Scale changed.
pub const SCALE_BIT: u16 = 0x4;
/// All per-field bits.
pub const FIELD_MASK: u16 = ORIENTATION_BIT | POSITION_BIT | SCALE_BIT;
/// Full rewrite requested; distinct from the per-field mask.
pub const FULL_REWRITE_BIT: u16 = 0x8000;

// ---------------------------------------------------------------------------
// WorldPose
// ---------------------------------------------------------------------------

/// An entity's pose in the observer's own world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPose {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for WorldPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

// ---------------------------------------------------------------------------
// CoordinateSync
// ---------------------------------------------------------------------------

/// Anchor-relative pose replication for a single entity.
#[derive(Debug, Clone)]
pub struct CoordinateSync {
    role: Role,
    anchor: RigidTransform,
    orientation: ReplicatedField<Quat, Angle>,
    position: ReplicatedField<Vec3, Distance>,
    scale: ReplicatedField<Vec3, Distance>,
    /// Set after a log restore; the next send carries every field.
    full_rewrite: bool,
    /// Host: the sampled pose. Client: the displayed pose.
    pose: WorldPose,
    reconcile: ReconcileConfig,
}

impl CoordinateSync {
    /// Create a synchronizer whose anchor-space state matches `pose`.
    pub fn new(role: Role, anchor: RigidTransform, pose: WorldPose, config: &SyncConfig) -> Self {
        let local_position = anchor.inverse_transform_point(pose.position);
        let local_orientation = anchor.inverse_transform_rotation(pose.rotation);
        Self {
            role,
            anchor,
            orientation: ReplicatedField::new(
                local_orientation,
                Angle(config.send.rotation_degrees),
            ),
            position: ReplicatedField::new(local_position, Distance(config.send.position)),
            scale: ReplicatedField::new(pose.scale, Distance(config.send.scale)),
            full_rewrite: false,
            pose,
            reconcile: config.reconcile,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn anchor(&self) -> &RigidTransform {
        &self.anchor
    }

    /// Replace the anchor, e.g. after the local observer recalibrates.
    pub fn set_anchor(&mut self, anchor: RigidTransform) {
        self.anchor = anchor;
    }

    /// Host: sampled pose. Client: pose currently on display.
    pub fn pose(&self) -> &WorldPose {
        &self.pose
    }

    /// Feed the host with the entity's current world pose.
    ///
    /// # Panics
    ///
    /// Panics on a client; clients only display what they receive.
    pub fn set_pose(&mut self, pose: WorldPose) {
        assert!(
            self.role.is_host(),
            "CoordinateSync::set_pose is only valid on the host"
        );
        self.pose = pose;
    }

    pub fn local_position(&self) -> Vec3 {
        *self.position.value()
    }

    pub fn local_orientation(&self) -> Quat {
        *self.orientation.value()
    }

    pub fn local_scale(&self) -> Vec3 {
        *self.scale.value()
    }

    /// Current dirty bits, including [`FULL_REWRITE_BIT`].
    pub fn dirty_mask(&self) -> u16 {
        let mut mask = 0;
        if self.orientation.is_dirty() {
            mask |= ORIENTATION_BIT;
        }
        if self.position.is_dirty() {
            mask |= POSITION_BIT;
        }
        if self.scale.is_dirty() {
            mask |= SCALE_BIT;
        }
        if self.full_rewrite {
            mask |= FULL_REWRITE_BIT;
        }
        mask
    }

    /// Run once per tick on both sides.
    pub fn sync(&mut self) {
        match self.role {
            Role::Host => self.host_sample(),
            Role::Client => self.client_reconcile(),
        }
    }

    fn host_sample(&mut self) {
        let local_position = self.anchor.inverse_transform_point(self.pose.position);
        let local_orientation = self.anchor.inverse_transform_rotation(self.pose.rotation);
        let local_scale = self.pose.scale;

        if self.full_rewrite {
            self.position.force(local_position);
            self.orientation.force(local_orientation);
            self.scale.force(local_scale);
        } else {
            self.position.set(local_position);
            self.orientation.set(local_orientation);
            self.scale.set(local_scale);
        }
    }

    /// World-space targets derived from the received anchor-space values.
    fn world_targets(&self) -> WorldPose {
        WorldPose {
            position: self.anchor.transform_point(*self.position.value()),
            rotation: (self.anchor.rotation * *self.orientation.value()).normalize(),
            scale: *self.scale.value(),
        }
    }

    fn client_reconcile(&mut self) {
        let target = self.world_targets();
        let (scale, _) = self.reconcile.scale().step(self.pose.scale, target.scale);
        let (position, _) = self.reconcile.position().step(self.pose.position, target.position);
        let (rotation, _) = self.reconcile.rotation().step(self.pose.rotation, target.rotation);
        self.pose = WorldPose {
            position,
            rotation,
            scale,
        };
    }

    fn read_all(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let orientation = reader.read_quat()?;
        let position = reader.read_vec3()?;
        let scale = reader.read_vec3()?;
        self.orientation.overwrite(orientation);
        self.position.overwrite(position);
        self.scale.overwrite(scale);
        Ok(())
    }

    fn write_all(&self, writer: &mut ByteWriter) {
        writer.write_quat(*self.orientation.value());
        writer.write_vec3(*self.position.value());
        writer.write_vec3(*self.scale.value());
    }
}

impl Replicated for CoordinateSync {
    fn is_dirty(&self) -> bool {
        self.dirty_mask() != 0
    }

    fn write_full(&self, writer: &mut ByteWriter) {
        self.write_all(writer);
    }

    fn write_delta(&self, writer: &mut ByteWriter) {
        let header = self.dirty_mask();
        assert!(header != 0, "CoordinateSync delta requested with an empty dirty mask");
        writer.write_u16(header);
        if header & FULL_REWRITE_BIT != 0 {
            self.write_all(writer);
            return;
        }
        if header & ORIENTATION_BIT != 0 {
            writer.write_quat(*self.orientation.value());
        }
        if header & POSITION_BIT != 0 {
            writer.write_vec3(*self.position.value());
        }
        if header & SCALE_BIT != 0 {
            writer.write_vec3(*self.scale.value());
        }
    }

    fn read_full(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        self.read_all(reader)
    }

    fn read_delta(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let header = reader.read_u16()?;
        if header & !(FIELD_MASK | FULL_REWRITE_BIT) != 0 {
            return Err(CodecError::InvalidValue {
                field: "coordinate delta header",
                value: u64::from(header),
            });
        }
        if header & FULL_REWRITE_BIT != 0 {
            return self.read_all(reader);
        }
        if header & ORIENTATION_BIT != 0 {
            let orientation = reader.read_quat()?;
            self.orientation.overwrite(orientation);
        }
        if header & POSITION_BIT != 0 {
            let position = reader.read_vec3()?;
            self.position.overwrite(position);
        }
        if header & SCALE_BIT != 0 {
            let scale = reader.read_vec3()?;
            self.scale.overwrite(scale);
        }
        Ok(())
    }

    fn reset_dirty(&mut self) {
        // Clean fields were not transmitted, so their baselines stay put.
        let all = self.full_rewrite;
        if all || self.orientation.is_dirty() {
            self.orientation.mark_sent();
        }
        if all || self.position.is_dirty() {
            self.position.mark_sent();
        }
        if all || self.scale.is_dirty() {
            self.scale.mark_sent();
        }
        self.full_rewrite = false;
    }

    fn take_full(&mut self) -> Vec<u8> {
        let bytes = self.encode_full();
        self.orientation.mark_sent();
        self.position.mark_sent();
        self.scale.mark_sent();
        self.full_rewrite = false;
        bytes
    }
}

impl Loggable for CoordinateSync {
    fn write_state(&self, writer: &mut ByteWriter) {
        self.write_all(writer);
    }

    /// Restores the anchor-space values, moves the pose straight to them and
    /// schedules a full rewrite for the next send.
    fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let orientation = reader.read_quat()?;
        let position = reader.read_vec3()?;
        let scale = reader.read_vec3()?;
        self.orientation.force(orientation);
        self.position.force(position);
        self.scale.force(scale);
        self.pose = self.world_targets();
        self.full_rewrite = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> RigidTransform {
        RigidTransform::new(Vec3::new(2.0, 0.0, -1.0), Quat::from_rotation_y(0.4))
    }

    fn host() -> CoordinateSync {
        CoordinateSync::new(Role::Host, anchor(), WorldPose::default(), &SyncConfig::default())
    }

    fn client_from(host: &CoordinateSync, client_anchor: RigidTransform) -> CoordinateSync {
        let mut client = CoordinateSync::new(
            Role::Client,
            client_anchor,
            WorldPose::default(),
            &SyncConfig::default(),
        );
        client.decode_full(&host.encode_full()).unwrap();
        client
    }

    #[test]
    fn movement_within_tolerance_stays_clean() {
        let mut h = host();
        let mut pose = WorldPose::default();
        pose.position.x += 0.004;
        h.set_pose(pose);
        h.sync();
        assert!(!h.is_dirty());
    }

    #[test]
    fn fields_are_tracked_independently() {
        let mut h = host();
        let mut pose = WorldPose::default();
        pose.position.y += 0.5;
        h.set_pose(pose);
        h.sync();
        assert_eq!(h.dirty_mask(), POSITION_BIT);

        pose.scale = Vec3::splat(2.0);
        h.set_pose(pose);
        h.sync();
        assert_eq!(h.dirty_mask(), POSITION_BIT | SCALE_BIT);
    }

    #[test]
    fn delta_carries_only_dirty_fields() {
        let mut h = host();
        let mut pose = WorldPose::default();
        pose.position.z = 1.0;
        h.set_pose(pose);
        h.sync();
        let delta = h.take_delta().unwrap();
        assert_eq!(delta.len(), 2 + 12);
        assert_eq!(u16::from_le_bytes([delta[0], delta[1]]), POSITION_BIT);
        assert!(!h.is_dirty());
        assert!(h.take_delta().is_none());
    }

    #[test]
    #[should_panic(expected = "nothing dirty")]
    fn encode_delta_without_changes_panics() {
        let h = host();
        let _ = h.encode_delta();
    }

    #[test]
    fn client_with_different_anchor_sees_same_relative_pose() {
        let mut h = host();
        let pose = WorldPose {
            position: Vec3::new(3.0, 1.0, 0.0),
            rotation: Quat::from_rotation_x(0.2),
            scale: Vec3::ONE,
        };
        h.set_pose(pose);
        h.sync();
        h.take_delta();

        let client_anchor = RigidTransform::from_translation(Vec3::new(100.0, 0.0, 0.0));
        let mut c = client_from(&h, client_anchor);
        // Large jump from the default pose: snaps on the first tick.
        c.sync();
        let expected = client_anchor.transform_point(h.local_position());
        assert!((c.pose().position - expected).length() < 1e-4);
    }

    #[test]
    fn client_damps_small_corrections() {
        let h = host();
        let mut c = client_from(&h, anchor());
        c.sync();
        let start = c.pose().position;

        let mut moved = CoordinateSync::new(
            Role::Host,
            anchor(),
            WorldPose {
                position: start + Vec3::new(0.02, 0.0, 0.0),
                ..WorldPose::default()
            },
            &SyncConfig::default(),
        );
        moved.sync();
        c.decode_full(&moved.take_full()).unwrap();
        c.sync();
        let moved_by = (c.pose().position - start).length();
        assert!((moved_by - 0.004).abs() < 1e-5);
    }

    #[test]
    fn log_restore_forces_full_rewrite() {
        let mut h = host();
        let mut pose = WorldPose::default();
        pose.position.x = 1.0;
        h.set_pose(pose);
        h.sync();
        let mut w = ByteWriter::new();
        h.write_state(&mut w);
        let blob = w.into_bytes();
        assert_eq!(blob.len(), 40);

        let mut other = host();
        other
            .read_state(&mut ByteReader::new(&blob))
            .unwrap();
        other.sync();
        assert_eq!(other.dirty_mask(), FIELD_MASK | FULL_REWRITE_BIT);
        assert!((other.pose().position - pose.position).length() < 1e-5);

        let delta = other.take_delta().unwrap();
        assert_eq!(delta.len(), 2 + 40);
        let mut receiver = CoordinateSync::new(
            Role::Client,
            anchor(),
            WorldPose::default(),
            &SyncConfig::default(),
        );
        receiver.decode_delta(&delta).unwrap();
        assert!((receiver.local_position() - other.local_position()).length() < 1e-6);
    }

    #[test]
    fn unknown_header_bits_are_rejected() {
        let mut c = host();
        let err = c.decode_delta(&0x0010u16.to_le_bytes()).unwrap_err();
        assert!(matches!(err, CodecError::InvalidValue { .. }));
    }

    #[test]
    #[should_panic(expected = "only valid on the host")]
    fn client_cannot_set_pose() {
        let mut c = CoordinateSync::new(
            Role::Client,
            anchor(),
            WorldPose::default(),
            &SyncConfig::default(),
        );
        c.set_pose(WorldPose::default());
    }
}
