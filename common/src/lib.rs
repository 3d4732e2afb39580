pub mod commands;
pub mod config;
pub mod error;
pub mod hardware;
pub mod history;
pub mod refresh;
pub mod schedule;
pub mod setpoint;
pub mod store;
pub mod thermostat;
pub mod topics;
pub mod types;

#[cfg(test)]
pub(crate) mod mocks;

pub use commands::{dispatch, CommandResponse, Method};
pub use config::{NetworkConfig, OverrideState, RuntimeConfig, ThermostatConfig};
pub use error::{
    CommandError, ConfigError, RefreshError, SensorError, StorageError, ValidationError,
};
pub use hardware::{Actuator, Sensor};
pub use history::ReadingHistory;
pub use refresh::Thermostat;
pub use schedule::{DayOfWeek, Program, Schedule};
pub use setpoint::{resolve, Resolution};
pub use store::{ConfigStore, JsonFileStore};
pub use thermostat::{EngineAction, ThermostatEngine};
pub use topics::*;
pub use types::{HeaterState, Reading, SensorSample, SetpointMode};
