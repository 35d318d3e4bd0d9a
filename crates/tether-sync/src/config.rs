//! Tolerance configuration for replicated coordinate systems.
//!
//! [`SyncConfig`] bundles the host-side send tolerances with the client-side
//! reconciliation thresholds. Both halves deserialize from partial JSON;
//! missing keys keep their defaults.

use serde::{Deserialize, Serialize};

use crate::reconcile::ReconcileConfig;

/// Host-side thresholds below which changes are not transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendTolerances {
    /// Position change (metres, anchor space) that triggers a send.
    pub position: f32,
    /// Rotation change (degrees) that triggers a send.
    pub rotation_degrees: f32,
    /// Scale change that triggers a send.
    pub scale: f32,
}

impl Default for SendTolerances {
    fn default() -> Self {
        Self {
            position: 0.005,
            rotation_degrees: 1.5,
            scale: 0.01,
        }
    }
}

/// Send tolerances plus reconciliation thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub send: SendTolerances,
    pub reconcile: ReconcileConfig,
}

impl SyncConfig {
    /// Check that every threshold is usable.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let thresholds = [
            ("send.position", self.send.position),
            ("send.rotation_degrees", self.send.rotation_degrees),
            ("send.scale", self.send.scale),
            ("reconcile.position_snap", self.reconcile.position_snap),
            ("reconcile.rotation_snap_degrees", self.reconcile.rotation_snap_degrees),
            ("reconcile.scale_snap", self.reconcile.scale_snap),
        ];
        for (name, value) in thresholds {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(format!("{name} must be non-negative and finite, got {value}"));
            }
        }
        let damping = self.reconcile.damping;
        if !(0.0..1.0).contains(&damping) {
            return Err(format!("reconcile.damping must be in [0, 1), got {damping}"));
        }
        Ok(())
    }
}
