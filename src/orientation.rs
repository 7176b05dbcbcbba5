//! Latest-sample registers shared between sensor delivery and the streaming loop

use crate::types::{SensorKind, SensorSample};
use nalgebra::Vector3;
use parking_lot::Mutex;

/// Copy of both registers taken at one instant
///
/// The loop works on a snapshot so a sample arriving mid-tick cannot tear
/// the vectors it is using.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrientationSnapshot {
    pub gravity: Vector3<f32>,
    pub geomagnetic: Vector3<f32>,
    pub has_gravity: bool,
    pub has_geomagnetic: bool,
}

impl OrientationSnapshot {
    /// Snapshot with both samples present
    pub fn ready(gravity: Vector3<f32>, geomagnetic: Vector3<f32>) -> Self {
        Self {
            gravity,
            geomagnetic,
            has_gravity: true,
            has_geomagnetic: true,
        }
    }

    /// Both samples have been received at least once
    pub fn is_ready(&self) -> bool {
        self.has_gravity && self.has_geomagnetic
    }

    /// `(gravity, geomagnetic)` once ready
    pub fn vectors(&self) -> Option<(Vector3<f32>, Vector3<f32>)> {
        self.is_ready().then_some((self.gravity, self.geomagnetic))
    }
}

/// Single-slot overwrite registers, one per sensor kind
///
/// One writer (the sensor source) and one reader (the streaming loop). Each
/// [`record`](Self::record) replaces the previous sample of its kind; no
/// history is kept.
///
/// # Example
/// ```
/// use compass_stream::{OrientationState, SensorKind, SensorSample};
///
/// let state = OrientationState::new();
/// assert!(!state.snapshot().is_ready());
///
/// state.record(SensorSample::new(SensorKind::Accelerometer, 0.0, 0.0, 9.8));
/// state.record(SensorSample::new(SensorKind::Magnetometer, 0.0, 50.0, 0.0));
/// assert!(state.snapshot().is_ready());
/// ```
#[derive(Debug, Default)]
pub struct OrientationState {
    inner: Mutex<OrientationSnapshot>,
}

impl OrientationState {
    /// Empty registers; nothing is ready
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the register for the sample's kind and mark it ready
    pub fn record(&self, sample: SensorSample) {
        let mut inner = self.inner.lock();
        match sample.kind {
            SensorKind::Accelerometer => {
                inner.gravity = sample.values;
                inner.has_gravity = true;
            }
            SensorKind::Magnetometer => {
                inner.geomagnetic = sample.values;
                inner.has_geomagnetic = true;
            }
        }
    }

    /// Copy both registers out under one lock
    pub fn snapshot(&self) -> OrientationSnapshot {
        *self.inner.lock()
    }
}
