//! Core types shared across the heading pipeline and the streaming session

use crate::error::{Error, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of hardware sensor delivering samples
///
/// # Example
/// ```
/// use compass_stream::SensorKind;
///
/// assert_eq!(SensorKind::Accelerometer.to_string(), "accelerometer");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Gravity source, m/s²
    Accelerometer,
    /// Geomagnetic field source, µT
    Magnetometer,
}

impl SensorKind {
    /// Both kinds, in the order the pipeline needs them
    pub const ALL: [SensorKind; 2] = [SensorKind::Accelerometer, SensorKind::Magnetometer];
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Accelerometer => f.write_str("accelerometer"),
            SensorKind::Magnetometer => f.write_str("magnetometer"),
        }
    }
}

/// A single three-axis reading tagged by the sensor that produced it
///
/// # Example
/// ```
/// use compass_stream::{SensorKind, SensorSample};
///
/// let sample = SensorSample::new(SensorKind::Accelerometer, 0.0, 0.0, 9.81);
/// assert_eq!(sample.values.z, 9.81);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Which sensor this sample came from
    pub kind: SensorKind,
    /// Device-frame vector
    pub values: Vector3<f32>,
}

impl SensorSample {
    /// Create a sample from its three components
    pub fn new(kind: SensorKind, x: f32, y: f32, z: f32) -> Self {
        Self {
            kind,
            values: Vector3::new(x, y, z),
        }
    }

    /// Accelerometer sample
    pub fn gravity(values: Vector3<f32>) -> Self {
        Self {
            kind: SensorKind::Accelerometer,
            values,
        }
    }

    /// Magnetometer sample
    pub fn geomagnetic(values: Vector3<f32>) -> Self {
        Self {
            kind: SensorKind::Magnetometer,
            values,
        }
    }
}

/// Caller-supplied configuration for one streaming session
///
/// Immutable once the session has started.
///
/// # Example
/// ```
/// use compass_stream::SessionConfig;
///
/// let config = SessionConfig::new("ws://127.0.0.1:1337/compass", true);
/// assert!(config.calibrate_on_start);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// WebSocket endpoint, e.g. `ws://192.168.1.134:1337/compass`
    pub server_address: String,
    /// Capture the first heading as the zero reference
    pub calibrate_on_start: bool,
}

impl SessionConfig {
    /// Session targeting `server_address`
    pub fn new(server_address: impl Into<String>, calibrate_on_start: bool) -> Self {
        Self {
            server_address: server_address.into(),
            calibrate_on_start,
        }
    }
}

/// Cadence and transport tuning for the streaming loop
///
/// The defaults stream two readings per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Period between ticks
    #[serde(with = "millis")]
    pub tick_interval: Duration,
    /// How long a graceful close waits for the peer's close frame
    #[serde(with = "millis")]
    pub close_timeout: Duration,
    /// Outbound frames buffered ahead of the socket before sends are dropped
    pub send_queue_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            close_timeout: Duration::from_secs(2),
            send_queue_capacity: 16,
        }
    }
}

impl StreamSettings {
    /// Longest accepted tick interval
    pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Largest accepted outbound queue
    pub const MAX_SEND_QUEUE_CAPACITY: usize = 4096;

    /// Check the settings can drive a session
    ///
    /// # Errors
    /// [`Error::Config`] when the tick interval is zero or longer than
    /// [`MAX_TICK_INTERVAL`](Self::MAX_TICK_INTERVAL), or the queue is larger
    /// than [`MAX_SEND_QUEUE_CAPACITY`](Self::MAX_SEND_QUEUE_CAPACITY).
    /// A zero queue capacity is treated as one.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(Error::Config("tick_interval must be non-zero".into()));
        }
        if self.tick_interval > Self::MAX_TICK_INTERVAL {
            return Err(Error::Config(format!(
                "tick_interval {:?} exceeds {:?}",
                self.tick_interval,
                Self::MAX_TICK_INTERVAL
            )));
        }
        if self.send_queue_capacity > Self::MAX_SEND_QUEUE_CAPACITY {
            return Err(Error::Config(format!(
                "send_queue_capacity {} exceeds {}",
                self.send_queue_capacity,
                Self::MAX_SEND_QUEUE_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Lifecycle of the outbound connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The connection was never established
    ConnectFailed(String),
    /// Closed by us with a completed (or timed out) close handshake
    Closed,
    /// The server sent a close frame
    ClosedByPeer,
    /// Transport error or the stream ended without a close handshake
    Lost(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            DisconnectReason::Closed => f.write_str("closed"),
            DisconnectReason::ClosedByPeer => f.write_str("closed by peer"),
            DisconnectReason::Lost(e) => write!(f, "connection lost: {e}"),
        }
    }
}

/// Connectivity notification surfaced to the session's caller
///
/// Fire-and-forget: nothing waits for the caller to observe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected(DisconnectReason),
}

/// Streaming loop state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopPhase {
    #[default]
    Idle,
    Running,
    Stopping,
    Terminated,
}

/// Counters from one finished streaming session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    /// Ticks executed
    pub ticks: u64,
    /// Ticks that produced a heading
    pub readings: u64,
    /// Frames written to the socket
    pub frames_sent: u64,
    /// Frames dropped because the connection was unavailable or backed up
    pub dropped_sends: u64,
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// An active session was cancelled and has terminated
    Stopped(LoopReport),
    /// There was nothing to stop
    NotRunning,
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
