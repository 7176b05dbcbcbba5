//! [![github]](https://github.com/wboayue/compass-stream)&ensp;[![crates-io]](https://crates.io/crates/compass-stream)&ensp;[![license]](https://opensource.org/licenses/MIT)
//!
//! [github]: https://img.shields.io/badge/github-8da0cb?style=for-the-badge&labelColor=555555&logo=github
//! [crates-io]: https://img.shields.io/badge/crates.io-fc8d62?style=for-the-badge&labelColor=555555&logo=rust
//! [license]: https://img.shields.io/badge/License-MIT-blue.svg?style=for-the-badge&labelColor=555555
//!
//! Compass Stream - compass headings from accelerometer and magnetometer data, streamed over WebSocket
//!
//! This library turns raw accelerometer and magnetometer samples into a
//! tilt-compensated compass heading, optionally zeroed at session start, and
//! sends it to a remote server twice a second as a small JSON message.
//!
//! # Features
//!
//! - Rotation-matrix heading estimation with explicit "undetermined" results
//! - Once-per-session zero calibration
//! - Latest-value sample registers safe to share between delivery and ticking
//! - Best-effort streaming that never blocks on the network
//! - Graceful close handshakes and connectivity events for the caller
//! - Simulated and CSV replay sensor sources
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use compass_stream::{HeadingPipeline, OrientationSnapshot};
//!
//! let mut pipeline = HeadingPipeline::new(true);
//!
//! // Sensor readings
//! let gravity = Vector3::new(0.0, 0.0, 9.8);        // m/s²
//! let facing_east = Vector3::new(-50.0, 0.0, -30.0); // µT
//! let facing_south = Vector3::new(0.0, -50.0, -30.0);
//!
//! // First reading becomes the zero reference
//! let zero = pipeline.tick(&OrientationSnapshot::ready(gravity, facing_east)).unwrap();
//! assert_eq!(zero, 0.0);
//!
//! // Later readings are relative to it
//! let turned = pipeline.tick(&OrientationSnapshot::ready(gravity, facing_south)).unwrap();
//! assert!((turned - 90.0).abs() < 1e-3);
//! ```
//!
//! To stream, hand a [`SensorSource`] to a [`SessionController`] and call
//! [`SessionController::start`].

pub mod calibration;
pub mod compass;
pub mod config;
pub mod connection;
mod error;
mod math;
pub mod orientation;
pub mod pipeline;
pub mod sensor;
pub mod session;
pub mod stream;
mod types;
pub mod wire;

// Re-export all public types and functions
pub use calibration::CalibrationState;
pub use compass::estimate;
pub use config::AppConfig;
pub use connection::{ConnectionManager, EventSink, NORMAL_CLOSURE};
pub use error::{Error, Result};
pub use math::{DEG_TO_RAD, RAD_TO_DEG, Vector3Ext, wrap_degrees};
pub use orientation::{OrientationSnapshot, OrientationState};
pub use pipeline::HeadingPipeline;
pub use sensor::{
    ReplayFrame, ReplaySource, SensorSource, SimulatedSettings, SimulatedSource, Subscription,
};
pub use session::SessionController;
pub use stream::{RunningLoop, StreamingLoop};
pub use types::*;
pub use wire::HeadingMessage;
