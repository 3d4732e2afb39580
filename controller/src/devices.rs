use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use tracing::info;

use nerdostat_common::{Actuator, Sensor, SensorError, SensorSample};

const TEMPERATURE_RANGE_C: std::ops::RangeInclusive<f64> = -40.0..=85.0;
const HUMIDITY_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

#[derive(Debug, Default)]
struct LatestSample {
    temperature: Option<f64>,
    humidity: Option<f64>,
    updated_at: Option<Instant>,
}

/// Cache of the last values published by the sensor node. The MQTT loop
/// writes into it, the control loop reads from it.
#[derive(Debug, Clone)]
pub struct MqttSensor {
    latest: Arc<Mutex<LatestSample>>,
    stale_after: Duration,
}

impl MqttSensor {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            latest: Arc::new(Mutex::new(LatestSample::default())),
            stale_after,
        }
    }

    pub fn update_temperature(&self, celsius: f64) -> Result<(), SensorError> {
        if !celsius.is_finite() || !TEMPERATURE_RANGE_C.contains(&celsius) {
            return Err(SensorError::Read(format!(
                "temperature {celsius} outside plausible range"
            )));
        }
        let mut latest = self.lock()?;
        latest.temperature = Some(celsius);
        latest.updated_at = Some(Instant::now());
        Ok(())
    }

    pub fn update_humidity(&self, percent: f64) -> Result<(), SensorError> {
        if !percent.is_finite() || !HUMIDITY_RANGE.contains(&percent) {
            return Err(SensorError::Read(format!(
                "humidity {percent} outside plausible range"
            )));
        }
        self.lock()?.humidity = Some(percent);
        Ok(())
    }

    fn read_at(&self, now: Instant) -> Result<SensorSample, SensorError> {
        let latest = self.lock()?;
        let (Some(temperature), Some(humidity), Some(updated_at)) =
            (latest.temperature, latest.humidity, latest.updated_at)
        else {
            return Err(SensorError::NoData);
        };

        let age = now.saturating_duration_since(updated_at);
        if age > self.stale_after {
            return Err(SensorError::Stale {
                age_ms: age.as_millis().try_into().unwrap_or(u64::MAX),
            });
        }
        Ok(SensorSample {
            temperature,
            humidity,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LatestSample>, SensorError> {
        self.latest
            .lock()
            .map_err(|_| SensorError::Read("sensor cache lock poisoned".to_string()))
    }
}

impl Sensor for MqttSensor {
    fn read(&mut self) -> Result<SensorSample, SensorError> {
        self.read_at(Instant::now())
    }
}

/// Stand-in for the relay and LED drivers: logs every state change.
#[derive(Debug, Default)]
pub struct LoggingActuator {
    heater: bool,
    indicator: bool,
}

#[cfg(test)]
impl LoggingActuator {
    pub fn heater(&self) -> bool {
        self.heater
    }
}

impl Actuator for LoggingActuator {
    fn set_heater(&mut self, on: bool) {
        self.heater = on;
        info!(on, "heater relay");
    }

    fn set_indicator(&mut self, on: bool) {
        if self.indicator != on {
            info!(on, "indicator");
        }
        self.indicator = on;
    }
}
