use chrono::{DateTime, Duration, FixedOffset};
use tracing::{debug, info};

use crate::{
    config::{OverrideState, ThermostatConfig},
    error::{ConfigError, ValidationError},
    schedule::Program,
    setpoint::resolve,
    types::{HeaterState, SetpointMode},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    HeaterOn,
    HeaterOff,
    IndicatorOn,
    IndicatorOff,
}

/// What one control evaluation decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlOutcome {
    pub setpoint: f64,
    pub mode: SetpointMode,
    pub override_remaining_ms: u64,
    pub heater: HeaterState,
    pub heater_run_seconds: u64,
}

/// Hysteresis decision for `diff = temperature - setpoint`.
///
/// Returns the state to move to, or `None` inside the dead band
/// `[-threshold, threshold]`.
pub fn decide(diff: f64, threshold: f64) -> Option<HeaterState> {
    if diff < -threshold {
        Some(HeaterState::On)
    } else if diff > threshold {
        Some(HeaterState::Off)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct ThermostatEngine {
    config: ThermostatConfig,
    heater: HeaterState,
}

impl ThermostatEngine {
    /// The heater always starts logically off and any persisted start time is
    /// dropped: a restart never resumes a run it cannot vouch for.
    pub fn new(mut config: ThermostatConfig) -> Self {
        if let Some(since) = config.heater_on_since.take() {
            info!("discarding heater start time {since} recorded before restart");
        }
        Self {
            config,
            heater: HeaterState::Off,
        }
    }

    pub fn config(&self) -> &ThermostatConfig {
        &self.config
    }

    pub fn heater_state(&self) -> HeaterState {
        self.heater
    }

    /// Commands that bring the actuator in line with the initial state.
    pub fn startup_actions(&self) -> Vec<EngineAction> {
        vec![EngineAction::HeaterOff, EngineAction::IndicatorOff]
    }

    pub fn evaluate(
        &mut self,
        temperature: f64,
        now: DateTime<FixedOffset>,
    ) -> Result<(ControlOutcome, Vec<EngineAction>), ConfigError> {
        let resolution = resolve(&self.config, now)?;
        if resolution.expired_override(&self.config.override_state) {
            info!("manual override expired, schedule resumes");
        }
        self.config.override_state = resolution.next_state;

        let mut actions = Vec::new();
        let diff = temperature - resolution.setpoint;
        match decide(diff, self.config.threshold) {
            Some(HeaterState::On) => self.turn_heater_on(now, &mut actions),
            Some(HeaterState::Off) => self.turn_heater_off(&mut actions),
            None => {}
        }
        debug!(
            temperature,
            setpoint = resolution.setpoint,
            diff,
            heater = self.heater.as_str(),
            "control evaluated"
        );

        let outcome = ControlOutcome {
            setpoint: resolution.setpoint,
            mode: resolution.mode,
            override_remaining_ms: resolution.override_remaining_ms,
            heater: self.heater,
            heater_run_seconds: self.runtime_seconds(now),
        };
        Ok((outcome, actions))
    }

    /// Consecutive seconds of the current heating run, 0 when off.
    pub fn runtime_seconds(&self, now: DateTime<FixedOffset>) -> u64 {
        match self.config.heater_on_since {
            Some(since) if self.heater.is_on() => (now - since).num_seconds().max(0) as u64,
            _ => 0,
        }
    }

    pub fn set_override(
        &mut self,
        setpoint: f64,
        hours: Option<f64>,
        now: DateTime<FixedOffset>,
    ) -> Result<(), ValidationError> {
        if !setpoint.is_finite() {
            return Err(ValidationError::InvalidSetpoint(setpoint));
        }
        let hours = hours.unwrap_or(self.config.override_default_duration_hours);
        if !hours.is_finite() || hours <= 0.0 {
            return Err(ValidationError::InvalidDuration(hours));
        }

        let until = Duration::try_milliseconds((hours * 3_600_000.0).round() as i64)
            .and_then(|duration| now.checked_add_signed(duration))
            .ok_or(ValidationError::InvalidDuration(hours))?;

        self.config.override_state = OverrideState::Timed { setpoint, until };
        info!("manual override {setpoint:.1}°C until {until}");
        Ok(())
    }

    pub fn set_away(&mut self) {
        let setpoint = self.config.away_setpoint;
        self.config.override_state = OverrideState::Away { setpoint };
        info!("away mode on, holding {setpoint:.1}°C");
    }

    pub fn revert_to_schedule(&mut self) {
        if self.config.override_state != OverrideState::None {
            info!("override cleared, schedule resumes");
        }
        self.config.override_state = OverrideState::None;
    }

    pub fn replace_schedule(&mut self, program: Program) -> Result<(), ValidationError> {
        self.config.schedule.replace(program)?;
        info!("schedule replaced");
        Ok(())
    }

    fn turn_heater_on(&mut self, now: DateTime<FixedOffset>, actions: &mut Vec<EngineAction>) {
        if self.heater.is_on() {
            return;
        }

        self.heater = HeaterState::On;
        if self.config.heater_on_since.is_none() {
            self.config.heater_on_since = Some(now);
        }
        actions.push(EngineAction::HeaterOn);
        actions.push(EngineAction::IndicatorOn);
        info!("heater on");
    }

    fn turn_heater_off(&mut self, actions: &mut Vec<EngineAction>) {
        if !self.heater.is_on() {
            return;
        }

        self.heater = HeaterState::Off;
        self.config.heater_on_since = None;
        actions.push(EngineAction::HeaterOff);
        actions.push(EngineAction::IndicatorOff);
        info!("heater off");
    }
}
