//! Seams to the physical world. The engine never touches a bus or a pin
//! directly; hosts plug their drivers in through these traits.

use crate::{error::SensorError, types::SensorSample};

pub trait Sensor {
    /// One temperature/humidity sample. Retries are the implementor's job.
    fn read(&mut self) -> Result<SensorSample, SensorError>;
}

/// Fire-and-forget outputs; there is no acknowledgement path.
pub trait Actuator {
    fn set_heater(&mut self, on: bool);
    fn set_indicator(&mut self, on: bool);
}
