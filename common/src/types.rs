use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaterState {
    #[default]
    Off,
    On,
}

impl HeaterState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }
}

/// Which layer produced the effective setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SetpointMode {
    Schedule,
    Override,
    Away,
}

impl SetpointMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "SCHEDULE",
            Self::Override => "OVERRIDE",
            Self::Away => "AWAY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub temperature: f64,
    pub humidity: f64,
}

/// Result of one refresh cycle. Doubles as the telemetry message and the
/// response body of the reading-returning remote methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<FixedOffset>,
    #[serde(rename = "Temperature")]
    pub temperature: f64,
    #[serde(rename = "Humidity")]
    pub humidity: f64,
    #[serde(rename = "CurrentSetpoint")]
    pub effective_setpoint: f64,
    #[serde(rename = "HeaterOn")]
    pub heater_run_seconds: u64,
    #[serde(rename = "IsHeaterOn")]
    pub heater_is_on: bool,
    #[serde(rename = "OverrideEnd")]
    pub override_remaining_ms: u64,
    #[serde(rename = "Mode")]
    pub mode: SetpointMode,
}
