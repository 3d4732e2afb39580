//! Setpoint resolution: override layering on top of the weekly schedule.

use chrono::{DateTime, FixedOffset};

use crate::{
    config::{OverrideState, ThermostatConfig},
    error::ConfigError,
    types::SetpointMode,
};

/// Outcome of resolving the effective setpoint at an instant.
///
/// `next_state` is the override state the caller must store: it differs from
/// the current one only when a timed override has run out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub setpoint: f64,
    pub override_remaining_ms: u64,
    pub mode: SetpointMode,
    pub next_state: OverrideState,
}

impl Resolution {
    pub fn expired_override(&self, previous: &OverrideState) -> bool {
        matches!(previous, OverrideState::Timed { .. })
            && self.next_state == OverrideState::None
    }
}

pub fn resolve(
    config: &ThermostatConfig,
    now: DateTime<FixedOffset>,
) -> Result<Resolution, ConfigError> {
    match config.override_state {
        OverrideState::Timed { setpoint, until } if until > now => {
            let remaining = (until - now).num_milliseconds().max(1);
            Ok(Resolution {
                setpoint,
                override_remaining_ms: remaining as u64,
                mode: SetpointMode::Override,
                next_state: config.override_state,
            })
        }
        OverrideState::Away { setpoint } => Ok(Resolution {
            setpoint,
            override_remaining_ms: 0,
            mode: SetpointMode::Away,
            next_state: config.override_state,
        }),
        OverrideState::Timed { .. } | OverrideState::None => Ok(Resolution {
            setpoint: config.schedule.at(&now)?,
            override_remaining_ms: 0,
            mode: SetpointMode::Schedule,
            next_state: OverrideState::None,
        }),
    }
}
