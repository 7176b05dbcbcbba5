//! Zero-offset calibration for compass headings

use crate::math::wrap_once;

/// Session-scoped heading offset
///
/// Starts uncalibrated. The first honored calibration request captures the
/// current raw heading as the zero reference; later requests are ignored, so
/// the offset stays fixed until the state is dropped with its session.
///
/// # Example
/// ```
/// use compass_stream::CalibrationState;
///
/// let mut calibration = CalibrationState::new();
/// calibration.request_calibration(90.0);
/// calibration.request_calibration(45.0); // ignored, already calibrated
///
/// assert_eq!(calibration.offset(), Some(90.0));
/// assert_eq!(calibration.apply_calibration(100.0), 10.0);
/// assert_eq!(calibration.apply_calibration(30.0), 300.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibrationState {
    offset: Option<f32>,
}

impl CalibrationState {
    /// Create an uncalibrated state
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `current_heading` as the zero reference if none is set yet
    ///
    /// # Arguments
    /// * `current_heading` - Raw (uncalibrated) heading in degrees, `[0, 360)`
    ///
    /// # Returns
    /// The stored offset, which is the first value ever passed in
    pub fn request_calibration(&mut self, current_heading: f32) -> f32 {
        match self.offset {
            Some(offset) => offset,
            None => {
                tracing::info!(offset = current_heading, "Calibration set");
                self.offset = Some(current_heading);
                current_heading
            }
        }
    }

    /// Apply the stored offset to a raw heading
    ///
    /// Pure in `(raw_heading, offset)`: without an offset the input is returned
    /// unchanged, otherwise `raw_heading - offset` wrapped once into `[0, 360)`.
    pub fn apply_calibration(&self, raw_heading: f32) -> f32 {
        match self.offset {
            Some(offset) => wrap_once(raw_heading - offset),
            None => raw_heading,
        }
    }

    /// Stored offset in degrees, if calibrated
    pub fn offset(&self) -> Option<f32> {
        self.offset
    }

    /// An offset has been captured
    pub fn is_calibrated(&self) -> bool {
        self.offset.is_some()
    }
}
