//! Error types for compass-stream

use crate::types::SensorKind;
use thiserror::Error;

/// Errors that stop a session from starting or a source from loading
///
/// Per-tick conditions (undetermined orientation, dropped sends) and
/// connection failures are not errors; they are skipped or reported as
/// [`ConnectionEvent`](crate::ConnectionEvent)s.
#[derive(Error, Debug)]
pub enum Error {
    #[error("required sensor unavailable: {0}")]
    SensorUnavailable(SensorKind),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("streaming task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
