use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, schedule::Schedule, types::SetpointMode};

pub const DEFAULT_THRESHOLD_C: f64 = 0.2;
pub const DEFAULT_OVERRIDE_DURATION_HOURS: f64 = 4.0;
pub const DEFAULT_AWAY_SETPOINT_C: f64 = 13.0;
pub const DEFAULT_FROST_SETPOINT_C: f64 = 5.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum OverrideState {
    /// The schedule governs.
    #[default]
    None,
    Timed {
        setpoint: f64,
        until: DateTime<FixedOffset>,
    },
    Away {
        setpoint: f64,
    },
}

impl OverrideState {
    pub fn mode(&self) -> SetpointMode {
        match self {
            Self::None => SetpointMode::Schedule,
            Self::Timed { .. } => SetpointMode::Override,
            Self::Away { .. } => SetpointMode::Away,
        }
    }
}

/// The persisted aggregate: schedule, override layering and the heater
/// runtime anchor. Saved in full after every refresh cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PersistedConfig", into = "PersistedConfig")]
pub struct ThermostatConfig {
    pub schedule: Schedule,
    pub threshold: f64,
    pub override_state: OverrideState,
    pub override_default_duration_hours: f64,
    pub away_setpoint: f64,
    /// Reserved; not consulted by setpoint resolution.
    pub frost_setpoint: f64,
    /// `Some` only while the heater is logically on.
    pub heater_on_since: Option<DateTime<FixedOffset>>,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            threshold: DEFAULT_THRESHOLD_C,
            override_state: OverrideState::None,
            override_default_duration_hours: DEFAULT_OVERRIDE_DURATION_HOURS,
            away_setpoint: DEFAULT_AWAY_SETPOINT_C,
            frost_setpoint: DEFAULT_FROST_SETPOINT_C,
            heater_on_since: None,
        }
    }
}

impl ThermostatConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        positive("threshold", self.threshold)?;
        positive(
            "override_default_duration_hours",
            self.override_default_duration_hours,
        )?;
        finite_setpoint(self.away_setpoint)?;
        finite_setpoint(self.frost_setpoint)?;
        match self.override_state {
            OverrideState::Timed { setpoint, .. } | OverrideState::Away { setpoint } => {
                finite_setpoint(setpoint)
            }
            OverrideState::None => Ok(()),
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidField { field, value })
    }
}

fn finite_setpoint(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::InvalidSetpoint(value))
    }
}

/// On-disk layout of [`ThermostatConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedConfig {
    schedule: Schedule,
    threshold: f64,
    override_setpoint: Option<f64>,
    override_until: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    away: bool,
    override_default_duration_hours: f64,
    away_setpoint: f64,
    frost_setpoint: f64,
    heater_on_since: Option<DateTime<FixedOffset>>,
}

impl TryFrom<PersistedConfig> for ThermostatConfig {
    type Error = ValidationError;

    fn try_from(persisted: PersistedConfig) -> Result<Self, Self::Error> {
        let override_state = match (
            persisted.away,
            persisted.override_setpoint,
            persisted.override_until,
        ) {
            (true, setpoint, _) => OverrideState::Away {
                setpoint: setpoint.unwrap_or(persisted.away_setpoint),
            },
            (false, Some(setpoint), Some(until)) => OverrideState::Timed { setpoint, until },
            _ => OverrideState::None,
        };

        let config = Self {
            schedule: persisted.schedule,
            threshold: persisted.threshold,
            override_state,
            override_default_duration_hours: persisted.override_default_duration_hours,
            away_setpoint: persisted.away_setpoint,
            frost_setpoint: persisted.frost_setpoint,
            heater_on_since: persisted.heater_on_since,
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<ThermostatConfig> for PersistedConfig {
    fn from(config: ThermostatConfig) -> Self {
        let (override_setpoint, override_until, away) = match config.override_state {
            OverrideState::None => (None, None, false),
            OverrideState::Timed { setpoint, until } => (Some(setpoint), Some(until), false),
            OverrideState::Away { setpoint } => (Some(setpoint), None, true),
        };

        Self {
            schedule: config.schedule,
            threshold: config.threshold,
            override_setpoint,
            override_until,
            away,
            override_default_duration_hours: config.override_default_duration_hours,
            away_setpoint: config.away_setpoint,
            frost_setpoint: config.frost_setpoint,
            heater_on_since: config.heater_on_since,
        }
    }
}

/// Process settings of the controller host. Not persisted; the host fills
/// them from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub regen_config: bool,
    pub timezone: String,
    pub refresh_interval_ms: u64,
    pub sensor_stale_timeout_ms: u64,
    pub history_capacity: usize,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./.nerdostat"),
            regen_config: false,
            timezone: "Europe/Rome".to_string(),
            refresh_interval_ms: 300_000,
            sensor_stale_timeout_ms: 600_000,
            history_capacity: crate::history::DEFAULT_HISTORY_CAPACITY,
            network: NetworkConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.refresh_interval_ms = self.refresh_interval_ms.clamp(1_000, 3_600_000);
        self.sensor_stale_timeout_ms = self.sensor_stale_timeout_ms.max(1_000);
        self.history_capacity = self.history_capacity.max(1);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            http_port: 8080,
        }
    }
}
