//! Tilt-compensated compass heading from gravity and geomagnetic vectors

use crate::math::{RAD_TO_DEG, Vector3Ext, wrap_degrees};
use nalgebra::{Matrix3, Vector3};

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f32 = 9.81;

/// Gravity below 10% of nominal means the device is in free fall
const FREE_FALL_GRAVITY_SQUARED: f32 = 0.01 * STANDARD_GRAVITY * STANDARD_GRAVITY;

/// Minimum magnitude of the east vector; typical values are well above 100
const MIN_EAST_MAGNITUDE: f32 = 0.1;

/// Compute the device-to-world rotation matrix
///
/// The world frame is East-North-Up. Rows of the returned matrix are the
/// world east, north and up axes expressed in device coordinates:
///
/// - east  = normalize(geomagnetic × gravity)
/// - up    = normalize(gravity)
/// - north = up × east
///
/// # Arguments
/// * `gravity` - Accelerometer reading in m/s² (device at rest measures +g up)
/// * `geomagnetic` - Magnetometer reading in µT
///
/// # Returns
/// `None` when the matrix is undetermined: the device is in free fall, the
/// two vectors are (nearly) collinear, or either input is not finite.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_stream::compass::rotation_matrix;
///
/// let r = rotation_matrix(Vector3::new(0.0, 0.0, 9.8), Vector3::new(0.0, 50.0, 0.0)).unwrap();
/// assert!((r[(1, 1)] - 1.0).abs() < 1e-6); // device Y points north
///
/// // Field parallel to gravity: no horizontal component to measure
/// assert!(rotation_matrix(Vector3::new(0.0, 0.0, 9.8), Vector3::new(0.0, 0.0, 50.0)).is_none());
/// ```
pub fn rotation_matrix(gravity: Vector3<f32>, geomagnetic: Vector3<f32>) -> Option<Matrix3<f32>> {
    if !gravity.is_finite() || !geomagnetic.is_finite() {
        return None;
    }

    if gravity.norm_squared() < FREE_FALL_GRAVITY_SQUARED {
        return None;
    }

    let east = geomagnetic.cross(&gravity);
    if east.norm() < MIN_EAST_MAGNITUDE {
        return None;
    }

    let east = east.safe_normalize();
    let up = gravity.safe_normalize();
    let north = up.cross(&east);

    Some(Matrix3::from_rows(&[
        east.transpose(),
        north.transpose(),
        up.transpose(),
    ]))
}

/// Derive Euler angles from a rotation matrix
///
/// # Returns
/// `(azimuth, pitch, roll)` in radians. Azimuth is in `[-π, π]`, measured
/// clockwise from north around the up axis.
pub fn orientation_angles(rotation: &Matrix3<f32>) -> (f32, f32, f32) {
    let azimuth = rotation[(0, 1)].atan2(rotation[(1, 1)]);
    let pitch = (-rotation[(2, 1)]).clamp(-1.0, 1.0).asin();
    let roll = (-rotation[(2, 0)]).atan2(rotation[(2, 2)]);
    (azimuth, pitch, roll)
}

/// Estimate the compass heading of the device
///
/// Combines [`rotation_matrix`] and [`orientation_angles`] and converts the
/// azimuth to degrees.
///
/// # Returns
/// Heading in degrees, range `[0, 360)`, `0` = magnetic north, increasing
/// clockwise. `None` when the orientation is undetermined.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_stream::compass::estimate;
///
/// let heading = estimate(Vector3::new(0.0, 0.0, 9.8), Vector3::new(0.0, 50.0, 0.0));
/// assert_eq!(heading, Some(0.0));
/// ```
pub fn estimate(gravity: Vector3<f32>, geomagnetic: Vector3<f32>) -> Option<f32> {
    let rotation = rotation_matrix(gravity, geomagnetic)?;
    let (azimuth, _, _) = orientation_angles(&rotation);
    Some(wrap_degrees(azimuth * RAD_TO_DEG))
}

/// Magnetometer reading a level device would see at the given heading
///
/// Inverse of [`estimate`] for a device lying flat, used by the simulated
/// source and by tests.
///
/// # Arguments
/// * `heading` - Heading in degrees
/// * `horizontal` - Horizontal field strength in µT
/// * `vertical` - Downward field component in µT (positive in the northern hemisphere)
pub fn level_field(heading: f32, horizontal: f32, vertical: f32) -> Vector3<f32> {
    let (sin, cos) = heading.to_radians().sin_cos();
    Vector3::new(-horizontal * sin, horizontal * cos, -vertical)
}
