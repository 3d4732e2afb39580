use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use crate::{
    config::ThermostatConfig,
    error::{CommandError, RefreshError, StorageError, ValidationError},
    hardware::{Actuator, Sensor},
    history::ReadingHistory,
    schedule::Program,
    store::ConfigStore,
    thermostat::{EngineAction, ThermostatEngine},
    types::Reading,
};

/// The engine wired to its sensor, actuator and store.
///
/// One `refresh` is one complete resolve, control and persist cycle; hosts
/// serialize refreshes and commands by holding this behind a single lock.
pub struct Thermostat<S, A, P> {
    engine: ThermostatEngine,
    sensor: S,
    actuator: A,
    store: P,
    history: ReadingHistory,
}

impl<S: Sensor, A: Actuator, P: ConfigStore> Thermostat<S, A, P> {
    pub fn new(
        config: ThermostatConfig,
        sensor: S,
        mut actuator: A,
        store: P,
        history_capacity: usize,
    ) -> Self {
        let engine = ThermostatEngine::new(config);
        apply(&mut actuator, &engine.startup_actions());
        Self {
            engine,
            sensor,
            actuator,
            store,
            history: ReadingHistory::new(history_capacity),
        }
    }

    /// Builds from the persisted config, writing defaults on first start.
    pub fn open(
        sensor: S,
        actuator: A,
        store: P,
        history_capacity: usize,
    ) -> Result<Self, StorageError> {
        let config = store.initialize_if_absent()?;
        Ok(Self::new(config, sensor, actuator, store, history_capacity))
    }

    pub fn refresh(&mut self, now: DateTime<FixedOffset>) -> Result<Reading, RefreshError> {
        let sample = self.sensor.read()?;
        let (outcome, actions) = self.engine.evaluate(sample.temperature, now)?;
        apply(&mut self.actuator, &actions);

        let reading = Reading {
            timestamp: now,
            temperature: sample.temperature,
            humidity: sample.humidity,
            effective_setpoint: outcome.setpoint,
            heater_run_seconds: outcome.heater_run_seconds,
            heater_is_on: outcome.heater.is_on(),
            override_remaining_ms: outcome.override_remaining_ms,
            mode: outcome.mode,
        };
        self.history.push(reading.clone());
        debug!(
            temperature = reading.temperature,
            setpoint = reading.effective_setpoint,
            mode = reading.mode.as_str(),
            "refresh complete"
        );

        if let Err(source) = self.persist() {
            warn!("config not persisted after refresh: {source}");
            return Err(RefreshError::Persist {
                reading: Box::new(reading),
                source,
            });
        }
        Ok(reading)
    }

    pub fn set_override(
        &mut self,
        setpoint: f64,
        hours: Option<f64>,
        now: DateTime<FixedOffset>,
    ) -> Result<(), ValidationError> {
        self.engine.set_override(setpoint, hours, now)
    }

    pub fn set_away(&mut self) {
        self.engine.set_away();
    }

    pub fn revert_to_schedule(&mut self) {
        self.engine.revert_to_schedule();
    }

    pub fn replace_schedule(&mut self, program: Program) -> Result<(), CommandError> {
        self.engine.replace_schedule(program)?;
        self.persist()?;
        Ok(())
    }

    pub fn persist(&self) -> Result<(), StorageError> {
        self.store.save(self.engine.config())
    }

    pub fn schedule(&self) -> Program {
        self.engine.config().schedule.to_program()
    }

    pub fn config(&self) -> &ThermostatConfig {
        self.engine.config()
    }

    pub fn engine(&self) -> &ThermostatEngine {
        &self.engine
    }

    pub fn history(&self) -> &ReadingHistory {
        &self.history
    }

    pub fn last_reading(&self) -> Option<&Reading> {
        self.history.latest()
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn store(&self) -> &P {
        &self.store
    }
}

fn apply(actuator: &mut impl Actuator, actions: &[EngineAction]) {
    for action in actions {
        match action {
            EngineAction::HeaterOn => actuator.set_heater(true),
            EngineAction::HeaterOff => actuator.set_heater(false),
            EngineAction::IndicatorOn => actuator.set_indicator(true),
            EngineAction::IndicatorOff => actuator.set_indicator(false),
        }
    }
}
