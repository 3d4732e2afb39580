use std::path::PathBuf;

use thiserror::Error;

use crate::types::Reading;

/// Failure of the sensor collaborator. Aborts the current refresh only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("no sensor data received yet")]
    NoData,
    #[error("sensor data is stale ({age_ms} ms old)")]
    Stale { age_ms: u64 },
    #[error("sensor read failed: {0}")]
    Read(String),
}

/// Rejected command input. Never leaves partial state behind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("schedule is missing weekday {weekday} hour {hour} quarter {quarter}")]
    MissingCell { weekday: u8, hour: u8, quarter: u8 },
    #[error("schedule key out of range: {0}")]
    UnexpectedKey(String),
    #[error("temperature at weekday {weekday} hour {hour} quarter {quarter} is not finite")]
    NonFiniteTemperature { weekday: u8, hour: u8, quarter: u8 },
    #[error("override duration must be a positive number of hours, got {0}")]
    InvalidDuration(f64),
    #[error("setpoint must be a finite temperature, got {0}")]
    InvalidSetpoint(f64),
    #[error("{field} must be a positive finite number, got {value}")]
    InvalidField { field: &'static str, value: f64 },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("persisted config at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Internal invariant violation. Indicates corrupted state, not bad input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("schedule cell out of range: weekday {weekday}, hour {hour}, quarter {quarter}")]
    CellOutOfRange {
        weekday: usize,
        hour: usize,
        quarter: usize,
    },
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Sensor(#[from] SensorError),
    /// The cycle completed but the config could not be saved; the in-memory
    /// state stays authoritative until the next successful save.
    #[error("reading taken but config not persisted: {source}")]
    Persist {
        reading: Box<Reading>,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why a remote method failed. Each variant maps to one response status.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CommandError {
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Sensor(_) => 503,
            Self::Storage(_) | Self::Config(_) | Self::Encode(_) => 500,
        }
    }
}
