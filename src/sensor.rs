//! Sensor sample delivery
//!
//! A [`SensorSource`] pushes samples into an [`OrientationState`] from its own
//! task until the returned [`Subscription`] is unregistered. The streaming loop
//! only ever reads the latest value of each kind, so sources may deliver at
//! any rate.

use crate::compass::{STANDARD_GRAVITY, level_field};
use crate::error::{Error, Result};
use crate::math::wrap_degrees;
use crate::orientation::OrientationState;
use crate::types::{SensorKind, SensorSample, millis};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Delivery period the platform uses for user-interface rate sensors
pub const UI_SAMPLE_PERIOD: Duration = Duration::from_millis(66);

const MIN_SAMPLE_PERIOD: Duration = Duration::from_millis(1);

/// Largest timestamp magnitude accepted in a recording, seconds (about 30 years)
const MAX_REPLAY_TIME: f32 = 1.0e9;

/// Producer of accelerometer and magnetometer samples
pub trait SensorSource: Send + Sync {
    /// Whether the device provides a sensor of this kind
    fn has_sensor(&self, kind: SensorKind) -> bool;

    /// Start delivering samples into `sink`
    ///
    /// Must be called from within a tokio runtime.
    fn subscribe(&self, sink: Arc<OrientationState>) -> Result<Subscription>;
}

/// Active registration with a [`SensorSource`]
///
/// Delivery stops on [`unregister`](Self::unregister) or drop.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Registration backed by a delivery task
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Registration with nothing to stop
    pub fn inert() -> Self {
        Self { task: None }
    }

    /// Stop delivery
    pub fn unregister(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Parameters of the simulated device
///
/// # Example
/// ```
/// use compass_stream::SimulatedSettings;
///
/// let settings = SimulatedSettings {
///     start_heading: 90.0,
///     rotation_rate: 10.0, // deg/s, clockwise
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedSettings {
    /// Heading at subscription time, degrees
    pub start_heading: f32,
    /// Yaw rate, degrees per second
    pub rotation_rate: f32,
    /// Horizontal geomagnetic field, µT
    pub horizontal_field: f32,
    /// Downward geomagnetic field, µT
    pub vertical_field: f32,
    /// Gravity magnitude, m/s²
    pub gravity: f32,
    /// Time between samples
    #[serde(with = "millis")]
    pub sample_period: Duration,
    /// Device has an accelerometer
    pub accelerometer: bool,
    /// Device has a magnetometer
    pub magnetometer: bool,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            start_heading: 0.0,
            rotation_rate: 0.0,
            horizontal_field: 20.0,
            vertical_field: 45.0,
            gravity: STANDARD_GRAVITY,
            sample_period: UI_SAMPLE_PERIOD,
            accelerometer: true,
            magnetometer: true,
        }
    }
}

impl SimulatedSettings {
    /// Heading of the simulated device after `elapsed`
    pub fn heading_at(&self, elapsed: Duration) -> f32 {
        wrap_degrees(self.start_heading + self.rotation_rate * elapsed.as_secs_f32())
    }
}

/// A level device turning at a constant rate
///
/// Stands in for hardware on hosts without motion sensors.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSource {
    settings: SimulatedSettings,
}

impl SimulatedSource {
    /// Simulated device with the given parameters
    pub fn new(settings: SimulatedSettings) -> Self {
        Self { settings }
    }

    /// A motionless device pointing at `heading`
    pub fn fixed(heading: f32) -> Self {
        Self::new(SimulatedSettings {
            start_heading: heading,
            ..Default::default()
        })
    }

    /// Parameters of this device
    pub fn settings(&self) -> &SimulatedSettings {
        &self.settings
    }
}

impl SensorSource for SimulatedSource {
    fn has_sensor(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::Accelerometer => self.settings.accelerometer,
            SensorKind::Magnetometer => self.settings.magnetometer,
        }
    }

    fn subscribe(&self, sink: Arc<OrientationState>) -> Result<Subscription> {
        let settings = self.settings;
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(settings.sample_period.max(MIN_SAMPLE_PERIOD));

            loop {
                ticker.tick().await;
                let heading = settings.heading_at(started.elapsed());

                if settings.accelerometer {
                    sink.record(SensorSample::gravity(Vector3::new(0.0, 0.0, settings.gravity)));
                }
                if settings.magnetometer {
                    let field = level_field(heading, settings.horizontal_field, settings.vertical_field);
                    sink.record(SensorSample::geomagnetic(field));
                }
            }
        });

        Ok(Subscription::from_task(task))
    }
}

#[derive(Debug, Deserialize)]
struct ReplayRow {
    #[serde(rename = "Time (s)")]
    time: f32,
    #[serde(rename = "Accelerometer X (m/s^2)")]
    accel_x: f32,
    #[serde(rename = "Accelerometer Y (m/s^2)")]
    accel_y: f32,
    #[serde(rename = "Accelerometer Z (m/s^2)")]
    accel_z: f32,
    #[serde(rename = "Magnetometer X (uT)")]
    mag_x: f32,
    #[serde(rename = "Magnetometer Y (uT)")]
    mag_y: f32,
    #[serde(rename = "Magnetometer Z (uT)")]
    mag_z: f32,
}

/// One recorded accelerometer + magnetometer pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayFrame {
    /// Seconds since the start of the recording
    pub time: f32,
    pub gravity: Vector3<f32>,
    pub geomagnetic: Vector3<f32>,
}

impl From<ReplayRow> for ReplayFrame {
    fn from(row: ReplayRow) -> Self {
        Self {
            time: row.time,
            gravity: Vector3::new(row.accel_x, row.accel_y, row.accel_z),
            geomagnetic: Vector3::new(row.mag_x, row.mag_y, row.mag_z),
        }
    }
}

/// Replays a CSV recording in a loop, at the recorded timing
///
/// Expected header:
///
/// ```text
/// Time (s),Accelerometer X (m/s^2),Accelerometer Y (m/s^2),Accelerometer Z (m/s^2),Magnetometer X (uT),Magnetometer Y (uT),Magnetometer Z (uT)
/// ```
#[derive(Debug, Clone)]
pub struct ReplaySource {
    frames: Arc<[ReplayFrame]>,
}

impl ReplaySource {
    /// Load a recording from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        Self::from_csv(reader)
    }

    /// Load a recording from any reader
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::from_csv(reader)
    }

    fn from_csv<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let mut frames = Vec::new();
        for row in reader.deserialize::<ReplayRow>() {
            let frame = ReplayFrame::from(row?);
            if !frame.time.is_finite() || frame.time.abs() > MAX_REPLAY_TIME {
                return Err(Error::Config(format!(
                    "replay timestamp {} out of range at row {}",
                    frame.time,
                    frames.len() + 1
                )));
            }
            frames.push(frame);
        }

        if frames.is_empty() {
            return Err(Error::Config("replay recording contains no samples".into()));
        }

        tracing::debug!(frames = frames.len(), "Loaded replay recording");
        Ok(Self {
            frames: frames.into(),
        })
    }

    /// Recorded frames in file order
    pub fn frames(&self) -> &[ReplayFrame] {
        &self.frames
    }

    /// Pause between the last frame and the first when looping
    fn loop_gap(&self) -> Duration {
        let n = self.frames.len();
        if n < 2 {
            return UI_SAMPLE_PERIOD;
        }
        let span = self.frames[n - 1].time - self.frames[0].time;
        let mean = (span / (n - 1) as f32).max(0.0);
        Duration::from_secs_f32(mean).max(MIN_SAMPLE_PERIOD)
    }
}

impl SensorSource for ReplaySource {
    fn has_sensor(&self, _kind: SensorKind) -> bool {
        true
    }

    fn subscribe(&self, sink: Arc<OrientationState>) -> Result<Subscription> {
        let frames = Arc::clone(&self.frames);
        let loop_gap = self.loop_gap();

        let task = tokio::spawn(async move {
            loop {
                let mut previous: Option<f32> = None;
                for frame in frames.iter() {
                    if let Some(previous) = previous {
                        let gap = (frame.time - previous).max(0.0);
                        tokio::time::sleep(Duration::from_secs_f32(gap)).await;
                    }
                    sink.record(SensorSample::gravity(frame.gravity));
                    sink.record(SensorSample::geomagnetic(frame.geomagnetic));
                    previous = Some(frame.time);
                }
                tokio::time::sleep(loop_gap).await;
            }
        });

        Ok(Subscription::from_task(task))
    }
}
