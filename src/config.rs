//! Optional TOML configuration for the command-line host

use crate::error::Result;
use crate::sensor::SimulatedSettings;
use crate::types::{SessionConfig, StreamSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default endpoint when neither the file nor the command line names one
pub const DEFAULT_SERVER_ADDRESS: &str = "ws://127.0.0.1:1337/compass";

/// Host configuration
///
/// Every field is optional in the file; missing ones take their defaults.
///
/// ```toml
/// server_address = "ws://192.168.1.134:1337/compass"
/// calibrate = true
///
/// [stream]
/// tick_interval = 500
///
/// [sensor]
/// rotation_rate = 15.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// WebSocket endpoint receiving headings
    pub server_address: String,
    /// Zero the heading on the first reading
    pub calibrate: bool,
    /// Streaming cadence and transport tuning
    pub stream: StreamSettings,
    /// Simulated device used when no recording is replayed
    pub sensor: SimulatedSettings,
    /// CSV recording to replay instead of the simulated device
    pub replay: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_owned(),
            calibrate: false,
            stream: StreamSettings::default(),
            sensor: SimulatedSettings::default(),
            replay: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        info!(?path, "Loaded config");
        Ok(config)
    }

    /// Parse configuration from TOML text
    ///
    /// Stream settings are validated here so a bad file fails before any
    /// session starts.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.stream.validate()?;
        Ok(config)
    }

    /// Values handed to the session at start
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.server_address.clone(), self.calibrate)
    }
}
