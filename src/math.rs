//! Angle helpers and nalgebra extensions shared by the estimator and calibration

use nalgebra::Vector3;

/// Degrees to radians
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
/// Radians to degrees
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Full turn in degrees
pub const FULL_TURN: f32 = 360.0;

/// Wrap any finite angle in degrees into `[0, 360)`.
///
/// `rem_euclid` can round a tiny negative input up to exactly `360.0` in
/// `f32`, so that case folds back to zero. Negative zero is returned as `+0.0`.
pub fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(FULL_TURN);
    if wrapped >= FULL_TURN {
        0.0
    } else {
        wrapped + 0.0
    }
}

/// Single-wrap normalization: values below zero get one full turn added.
///
/// Only valid when the input is already in `(-360, 360)`, which holds for the
/// difference of two headings in `[0, 360)`.
pub fn wrap_once(degrees: f32) -> f32 {
    let adjusted = if degrees < 0.0 { degrees + FULL_TURN } else { degrees };
    if adjusted >= FULL_TURN { 0.0 } else { adjusted + 0.0 }
}

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Normalize the vector, returning zero vector if magnitude is zero
    fn safe_normalize(&self) -> Vector3<f32>;

    /// True when every component is finite
    fn is_finite(&self) -> bool;
}

impl Vector3Ext for Vector3<f32> {
    fn safe_normalize(&self) -> Vector3<f32> {
        let mag = self.norm();
        if mag > 0.0 {
            *self / mag
        } else {
            Vector3::zeros()
        }
    }

    fn is_finite(&self) -> bool {
        self.iter().all(|component| component.is_finite())
    }
}
