//! Receive-side reconciliation: snap or damp toward a received target.
//!
//! Each tick the displayed value is compared to the latest received target.
//! A discrepancy above the field's snap threshold is corrected at once
//! (teleports, reconnects, large corrections). Anything smaller is damped:
//! `displayed := lerp(target, displayed, damping)`, so the gap shrinks by the
//! factor `damping` per tick and network jitter is hidden.
//!
//! The policy does not care whether the target arrived as a delta or a full
//! state.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::transform::angle_between_degrees;

// ---------------------------------------------------------------------------
// Blend
// ---------------------------------------------------------------------------

/// Values the reconciliation policy can measure and interpolate.
pub trait Blend: Copy {
    /// Size of the discrepancy between two values, in the unit used by the
    /// snap threshold (metres for vectors, degrees for rotations).
    fn discrepancy(self, other: Self) -> f32;

    /// Linear interpolation from `self` (t = 0) to `other` (t = 1).
    fn blend(self, other: Self, t: f32) -> Self;
}

impl Blend for f32 {
    fn discrepancy(self, other: Self) -> f32 {
        (self - other).abs()
    }

    fn blend(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Blend for Vec3 {
    fn discrepancy(self, other: Self) -> f32 {
        self.distance(other)
    }

    fn blend(self, other: Self, t: f32) -> Self {
        self.lerp(other, t)
    }
}

impl Blend for Quat {
    fn discrepancy(self, other: Self) -> f32 {
        angle_between_degrees(self, other)
    }

    /// Normalized lerp along the shorter arc.
    fn blend(self, other: Self, t: f32) -> Self {
        self.lerp(other, t)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What a reconciliation step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The displayed value jumped to the target.
    Snapped,
    /// The displayed value moved part of the way toward the target.
    Damped,
}

/// Snap threshold plus damping factor for one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapPolicy {
    /// Discrepancies strictly above this are corrected immediately.
    pub snap_threshold: f32,
    /// Fraction of the gap that remains after one damped tick.
    pub damping: f32,
}

impl SnapPolicy {
    /// Compute the next displayed value.
    pub fn step<T: Blend>(&self, displayed: T, target: T) -> (T, ReconcileOutcome) {
        if displayed.discrepancy(target) > self.snap_threshold {
            (target, ReconcileOutcome::Snapped)
        } else {
            (target.blend(displayed, self.damping), ReconcileOutcome::Damped)
        }
    }
}

/// Per-field thresholds for reconciling a synchronized coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Position discrepancy (metres) above which the client snaps.
    pub position_snap: f32,
    /// Rotation discrepancy (degrees) above which the client snaps.
    pub rotation_snap_degrees: f32,
    /// Scale discrepancy above which the client snaps.
    pub scale_snap: f32,
    /// Remaining fraction of the gap after one damped tick, in `[0, 1)`.
    pub damping: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            position_snap: 0.1,
            rotation_snap_degrees: 25.0,
            scale_snap: 0.05,
            damping: 0.8,
        }
    }
}

impl ReconcileConfig {
    pub fn position(&self) -> SnapPolicy {
        SnapPolicy {
            snap_threshold: self.position_snap,
            damping: self.damping,
        }
    }

    pub fn rotation(&self) -> SnapPolicy {
        SnapPolicy {
            snap_threshold: self.rotation_snap_degrees,
            damping: self.damping,
        }
    }

    pub fn scale(&self) -> SnapPolicy {
        SnapPolicy {
            snap_threshold: self.scale_snap,
            damping: self.damping,
        }
    }
}

// ---------------------------------------------------------------------------
// Smoothed
// ---------------------------------------------------------------------------

/// A received target and the value currently on display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothed<T> {
    target: T,
    displayed: T,
}

impl<T: Blend> Smoothed<T> {
    /// Start with target and display both at `value`.
    pub fn new(value: T) -> Self {
        Self {
            target: value,
            displayed: value,
        }
    }

    /// Record a newly received target. The display catches up in
    /// [`step`](Self::step).
    pub fn set_target(&mut self, target: T) {
        self.target = target;
    }

    /// Move the display toward the target by one tick.
    pub fn step(&mut self, policy: &SnapPolicy) -> ReconcileOutcome {
        let (next, outcome) = policy.step(self.displayed, self.target);
        self.displayed = next;
        outcome
    }

    /// Jump both target and display to `value`.
    pub fn reset(&mut self, value: T) {
        self.target = value;
        self.displayed = value;
    }

    pub fn target(&self) -> T {
        self.target
    }

    pub fn displayed(&self) -> T {
        self.displayed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
