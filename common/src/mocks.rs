//! Test doubles for the collaborator traits.

use std::cell::{Cell, RefCell};

use crate::{
    config::ThermostatConfig,
    error::{SensorError, StorageError},
    hardware::{Actuator, Sensor},
    store::ConfigStore,
    types::SensorSample,
};

/// Returns whatever it was last told to.
pub(crate) struct FakeSensor {
    next: Result<SensorSample, SensorError>,
}

impl FakeSensor {
    pub(crate) fn at(temperature: f64) -> Self {
        Self {
            next: Ok(SensorSample {
                temperature,
                humidity: 55.0,
            }),
        }
    }

    pub(crate) fn set(&mut self, temperature: f64) {
        self.next = Ok(SensorSample {
            temperature,
            humidity: 55.0,
        });
    }

    pub(crate) fn fail(&mut self, err: SensorError) {
        self.next = Err(err);
    }
}

impl Sensor for FakeSensor {
    fn read(&mut self) -> Result<SensorSample, SensorError> {
        self.next.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Output {
    Heater(bool),
    Indicator(bool),
}

#[derive(Default)]
pub(crate) struct RecordingActuator {
    pub(crate) commands: Vec<Output>,
}

impl Actuator for RecordingActuator {
    fn set_heater(&mut self, on: bool) {
        self.commands.push(Output::Heater(on));
    }

    fn set_indicator(&mut self, on: bool) {
        self.commands.push(Output::Indicator(on));
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    saved: RefCell<Option<ThermostatConfig>>,
    saves: Cell<usize>,
    fail_saves: Cell<bool>,
}

impl MemoryStore {
    pub(crate) fn with(config: ThermostatConfig) -> Self {
        let store = Self::default();
        store.saved.replace(Some(config));
        store
    }

    pub(crate) fn saved(&self) -> Option<ThermostatConfig> {
        self.saved.borrow().clone()
    }

    pub(crate) fn saves(&self) -> usize {
        self.saves.get()
    }

    pub(crate) fn fail_saves(&self, fail: bool) {
        self.fail_saves.set(fail);
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> Result<Option<ThermostatConfig>, StorageError> {
        Ok(self.saved())
    }

    fn save(&self, config: &ThermostatConfig) -> Result<(), StorageError> {
        if self.fail_saves.get() {
            return Err(StorageError::Io {
                path: "memory".into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.saves.set(self.saves.get() + 1);
        self.saved.replace(Some(config.clone()));
        Ok(())
    }
}
