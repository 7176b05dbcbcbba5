//! Heading pipeline: estimator plus session calibration

use crate::calibration::CalibrationState;
use crate::compass;
use crate::orientation::OrientationSnapshot;

/// Turns sample snapshots into calibrated headings
///
/// Owns the session's [`CalibrationState`]. When calibration was requested
/// at session start, the first tick that yields a heading captures it as the
/// zero reference; every tick after that is reported relative to it.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use compass_stream::{HeadingPipeline, OrientationSnapshot};
///
/// let mut pipeline = HeadingPipeline::new(false);
/// let snapshot = OrientationSnapshot::ready(Vector3::new(0.0, 0.0, 9.8), Vector3::new(0.0, 50.0, 0.0));
///
/// assert_eq!(pipeline.tick(&snapshot), Some(0.0));
/// assert_eq!(pipeline.tick(&OrientationSnapshot::default()), None);
/// ```
#[derive(Debug, Clone)]
pub struct HeadingPipeline {
    calibration: CalibrationState,
    calibrate_on_start: bool,
    calibration_pending: bool,
}

impl HeadingPipeline {
    /// Create a pipeline for a new session
    ///
    /// # Arguments
    /// * `calibrate_on_start` - Zero the heading on the first successful tick
    pub fn new(calibrate_on_start: bool) -> Self {
        Self {
            calibration: CalibrationState::new(),
            calibrate_on_start,
            calibration_pending: calibrate_on_start,
        }
    }

    /// Produce this tick's heading, if any
    ///
    /// Returns `None` without side effects when either sample is missing or
    /// the orientation is undetermined. Otherwise performs the one pending
    /// calibration request, then returns the calibrated heading in `[0, 360)`.
    pub fn tick(&mut self, snapshot: &OrientationSnapshot) -> Option<f32> {
        let raw = self.raw_heading(snapshot)?;

        if self.calibration_pending {
            self.calibration.request_calibration(raw);
            self.calibration_pending = false;
        }

        Some(self.calibration.apply_calibration(raw))
    }

    /// Uncalibrated heading for a snapshot
    pub fn raw_heading(&self, snapshot: &OrientationSnapshot) -> Option<f32> {
        let (gravity, geomagnetic) = snapshot.vectors()?;
        compass::estimate(gravity, geomagnetic)
    }

    /// Stored zero reference, once captured
    pub fn calibration_offset(&self) -> Option<f32> {
        self.calibration.offset()
    }

    /// Whether this session zeroes its first heading
    pub fn calibrate_on_start(&self) -> bool {
        self.calibrate_on_start
    }
}
