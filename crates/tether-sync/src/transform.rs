//! Rigid transforms (position + rotation) used for coordinate conversion.
//!
//! [`RigidTransform`] is a lightweight value type: every operation returns a
//! new instance and the rotation is kept normalized. It is what the
//! coordinate synchronization uses to move between world space and the
//! shared anchor space.
//!
//! # Example
//!
//! ```
//! use glam::{Quat, Vec3};
//! use tether_sync::transform::RigidTransform;
//!
//! let anchor = RigidTransform::new(Vec3::new(1.0, 0.0, 0.0), Quat::from_rotation_y(0.5));
//! let local = anchor.inverse_transform_point(Vec3::new(2.0, 1.0, 0.0));
//! let world = anchor.transform_point(local);
//! assert!((world - Vec3::new(2.0, 1.0, 0.0)).length() < 1e-5);
//! ```

use std::ops::Mul;

use glam::{Quat, Vec3};

// ---------------------------------------------------------------------------
// RigidTransform
// ---------------------------------------------------------------------------

/// A position plus a unit rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    /// Translation component.
    pub position: Vec3,
    /// Rotation component. Always a unit quaternion.
    pub rotation: Quat,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    /// The transform that maps every point onto itself.
    pub const IDENTITY: RigidTransform = RigidTransform {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Create a transform, normalizing `rotation`.
    ///
    /// # Panics
    ///
    /// Panics if `rotation` has zero length or is not finite.
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        let length = rotation.length();
        assert!(
            length.is_finite() && length > f32::EPSILON,
            "RigidTransform rotation must be a non-zero finite quaternion, got {rotation:?}"
        );
        Self {
            position,
            rotation: rotation / length,
        }
    }

    /// A pure translation.
    pub fn from_translation(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Concatenate two transforms: `self` applied after `other`.
    ///
    /// `C.position = A.position + A.rotation * B.position` and
    /// `C.rotation = A.rotation * B.rotation`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            position: self.position + self.rotation * other.position,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    /// The inverse transform.
    pub fn inverse(&self) -> RigidTransform {
        let inverse_rotation = self.rotation.conjugate();
        RigidTransform {
            position: -(inverse_rotation * self.position),
            rotation: inverse_rotation,
        }
    }

    /// Map a point from local into parent space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    /// Rotate a direction into parent space (translation is ignored).
    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    /// Map a point from parent space into local space.
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.conjugate() * (point - self.position)
    }

    /// Express a world rotation relative to this transform.
    pub fn inverse_transform_rotation(&self, rotation: Quat) -> Quat {
        (self.rotation.conjugate() * rotation).normalize()
    }

    /// Whether both components agree within `epsilon`.
    ///
    /// `q` and `-q` describe the same rotation, so the rotation check is
    /// sign-insensitive.
    pub fn approx_eq(&self, other: &RigidTransform, epsilon: f32) -> bool {
        let position_ok = (self.position - other.position).length() <= epsilon;
        let dot = self.rotation.dot(other.rotation).abs();
        position_ok && (1.0 - dot) <= epsilon
    }
}

impl Mul for RigidTransform {
    type Output = RigidTransform;

    fn mul(self, rhs: RigidTransform) -> RigidTransform {
        self.compose(&rhs)
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Dot products this close to one count as identical rotations; `acos` is
/// too noisy near 1 to resolve anything smaller.
const SAME_ROTATION_DOT: f32 = 1.0 - 1e-6;

/// Angular difference between two rotations in degrees, in `[0, 180]`.
pub fn angle_between_degrees(a: Quat, b: Quat) -> f32 {
    let dot = a.dot(b).abs().min(1.0);
    if dot >= SAME_ROTATION_DOT {
        return 0.0;
    }
    (2.0 * dot.acos()).to_degrees()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn sample() -> RigidTransform {
        RigidTransform::new(
            Vec3::new(1.0, -2.0, 3.5),
            Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0).normalize(), 0.7),
        )
    }

    #[test]
    fn new_normalizes_rotation() {
        let t = RigidTransform::new(Vec3::ZERO, Quat::from_xyzw(0.0, 0.0, 0.0, 2.0));
        assert!((t.rotation.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "non-zero finite quaternion")]
    fn zero_rotation_panics() {
        let _ = RigidTransform::new(Vec3::ZERO, Quat::from_xyzw(0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn compose_with_inverse_is_identity() {
        let t = sample();
        assert!((t * t.inverse()).approx_eq(&RigidTransform::IDENTITY, 1e-5));
        assert!((t.inverse() * t).approx_eq(&RigidTransform::IDENTITY, 1e-5));
    }

    #[test]
    fn compose_is_not_commutative() {
        let a = RigidTransform::new(Vec3::X, Quat::from_rotation_z(FRAC_PI_2));
        let b = RigidTransform::from_translation(Vec3::Y);
        assert!(!(a * b).approx_eq(&(b * a), 1e-4));
    }

    #[test]
    fn transform_point_applies_rotation_then_translation() {
        let t = RigidTransform::new(Vec3::new(10.0, 0.0, 0.0), Quat::from_rotation_z(FRAC_PI_2));
        let p = t.transform_point(Vec3::X);
        assert!((p - Vec3::new(10.0, 1.0, 0.0)).length() < 1e-5);
        let d = t.transform_direction(Vec3::X);
        assert!((d - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn inverse_transform_point_round_trips() {
        let t = sample();
        let p = Vec3::new(-4.0, 0.25, 9.0);
        let back = t.transform_point(t.inverse_transform_point(p));
        assert!((back - p).length() < 1e-4);
    }

    #[test]
    fn angle_between_is_sign_insensitive() {
        let q = Quat::from_rotation_x(0.3);
        assert!(angle_between_degrees(q, -q) < 1e-2);
        let r = Quat::from_rotation_x(0.3 + 30f32.to_radians());
        assert!((angle_between_degrees(q, r) - 30.0).abs() < 1e-2);
    }
}
