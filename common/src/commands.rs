//! Remote method dispatch shared by the MQTT and HTTP surfaces.

use chrono::{DateTime, Duration, FixedOffset};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::{
    error::{CommandError, RefreshError, ValidationError},
    hardware::{Actuator, Sensor},
    refresh::Thermostat,
    schedule::Program,
    store::ConfigStore,
    types::Reading,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ReadNow,
    SetManualSetPoint,
    ClearManualSetPoint,
    SetAwayOn,
    SetAwayOff,
    GetProgram,
    SetProgram,
    GetHistory,
}

impl Method {
    pub const ALL: [Method; 8] = [
        Method::ReadNow,
        Method::SetManualSetPoint,
        Method::ClearManualSetPoint,
        Method::SetAwayOn,
        Method::SetAwayOff,
        Method::GetProgram,
        Method::SetProgram,
        Method::GetHistory,
    ];

    /// Method names are matched without regard to ASCII case.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadNow => "ReadNow",
            Self::SetManualSetPoint => "SetManualSetPoint",
            Self::ClearManualSetPoint => "ClearManualSetPoint",
            Self::SetAwayOn => "SetAwayOn",
            Self::SetAwayOff => "SetAwayOff",
            Self::GetProgram => "GetProgram",
            Self::SetProgram => "SetProgram",
            Self::GetHistory => "GetHistory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub status: u16,
    pub body: Value,
}

impl CommandResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn not_defined() -> Self {
        Self {
            status: 404,
            body: json!({ "Response": "Not Defined" }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SetPointRequest {
    #[serde(alias = "Setpoint")]
    setpoint: f64,
    #[serde(default, alias = "Hours")]
    hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProgramPayload {
    Wrapped {
        #[serde(rename = "Program")]
        program: Program,
    },
    Bare(Program),
}

impl ProgramPayload {
    fn into_program(self) -> Program {
        match self {
            Self::Wrapped { program } | Self::Bare(program) => program,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct HistoryRequest {
    #[serde(default, alias = "Days")]
    days: Option<f64>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse<'a> {
    #[serde(rename = "Readings")]
    readings: Vec<&'a Reading>,
    #[serde(rename = "HeaterSeconds")]
    heater_seconds: u64,
}

pub fn dispatch<S, A, P>(
    thermostat: &mut Thermostat<S, A, P>,
    method: &str,
    payload: &[u8],
    now: DateTime<FixedOffset>,
) -> CommandResponse
where
    S: Sensor,
    A: Actuator,
    P: ConfigStore,
{
    let Some(parsed) = Method::parse(method) else {
        warn!("remote method {method:?} is not defined");
        return CommandResponse::not_defined();
    };

    info!(method = parsed.as_str(), "remote method invoked");
    match run(thermostat, parsed, payload, now) {
        Ok(body) => CommandResponse::ok(body),
        Err(err) => {
            let status = err.status();
            match &err {
                CommandError::Config(_) | CommandError::Encode(_) => {
                    error!(method = parsed.as_str(), "remote method failed: {err}")
                }
                _ => warn!(method = parsed.as_str(), status, "remote method rejected: {err}"),
            }
            CommandResponse::error(status, err.to_string())
        }
    }
}

fn run<S, A, P>(
    thermostat: &mut Thermostat<S, A, P>,
    method: Method,
    payload: &[u8],
    now: DateTime<FixedOffset>,
) -> Result<Value, CommandError>
where
    S: Sensor,
    A: Actuator,
    P: ConfigStore,
{
    match method {
        Method::ReadNow => match thermostat.refresh(now) {
            Ok(reading) => Ok(serde_json::to_value(reading)?),
            Err(err) => Err(refresh_failure(err)),
        },
        Method::SetManualSetPoint => {
            let request: SetPointRequest = parse_payload(payload)?.ok_or_else(|| {
                ValidationError::InvalidPayload("missing setpoint".to_string())
            })?;
            thermostat.set_override(request.setpoint, request.hours, now)?;
            refresh_after_change(thermostat, now)
        }
        Method::ClearManualSetPoint | Method::SetAwayOff => {
            thermostat.revert_to_schedule();
            refresh_after_change(thermostat, now)
        }
        Method::SetAwayOn => {
            thermostat.set_away();
            refresh_after_change(thermostat, now)
        }
        Method::GetProgram => Ok(serde_json::to_value(thermostat.schedule())?),
        Method::SetProgram => {
            let program = parse_payload::<ProgramPayload>(payload)?
                .ok_or_else(|| ValidationError::InvalidPayload("missing program".to_string()))?
                .into_program();
            thermostat.replace_schedule(program)?;
            Ok(serde_json::to_value(thermostat.schedule())?)
        }
        Method::GetHistory => {
            let request: HistoryRequest = parse_payload(payload)?.unwrap_or_default();
            let days = request.days.unwrap_or(1.0);
            let cutoff = history_cutoff(now, days)?;
            let history = thermostat.history();
            Ok(serde_json::to_value(HistoryResponse {
                readings: history.since(cutoff).collect(),
                heater_seconds: history.heater_seconds_since(cutoff),
            })?)
        }
    }
}

/// Refresh after a config mutation. The mutation is saved even when the
/// sensor cannot be read, so the command survives a restart.
fn refresh_after_change<S, A, P>(
    thermostat: &mut Thermostat<S, A, P>,
    now: DateTime<FixedOffset>,
) -> Result<Value, CommandError>
where
    S: Sensor,
    A: Actuator,
    P: ConfigStore,
{
    match thermostat.refresh(now) {
        Ok(reading) => Ok(serde_json::to_value(reading)?),
        Err(RefreshError::Sensor(err)) => {
            thermostat.persist()?;
            Err(err.into())
        }
        Err(err) => Err(refresh_failure(err)),
    }
}

fn refresh_failure(err: RefreshError) -> CommandError {
    match err {
        RefreshError::Sensor(err) => err.into(),
        RefreshError::Persist { source, .. } => source.into(),
        RefreshError::Config(err) => err.into(),
    }
}

fn parse_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<Option<T>, ValidationError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<Option<T>>(payload)
        .map_err(|err| ValidationError::InvalidPayload(err.to_string()))
}

fn history_cutoff(
    now: DateTime<FixedOffset>,
    days: f64,
) -> Result<DateTime<FixedOffset>, ValidationError> {
    let invalid = ValidationError::InvalidField {
        field: "days",
        value: days,
    };
    if !days.is_finite() || days <= 0.0 {
        return Err(invalid);
    }
    Duration::try_seconds((days * 86_400.0).round() as i64)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or(invalid)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::OverrideState,
        error::SensorError,
        mocks::{FakeSensor, MemoryStore, RecordingActuator},
    };

    type TestThermostat = Thermostat<FakeSensor, RecordingActuator, MemoryStore>;

    fn monday(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 5, hour, minute, 0)
            .unwrap()
    }

    fn thermostat() -> TestThermostat {
        Thermostat::open(
            FakeSensor::at(20.0),
            RecordingActuator::default(),
            MemoryStore::default(),
            32,
        )
        .unwrap()
    }

    #[test]
    fn unknown_method_is_not_defined() {
        let mut thermostat = thermostat();
        let response = dispatch(&mut thermostat, "Reboot", b"", monday(10, 0));
        assert_eq!(response.status, 404);
        assert_eq!(response.body, json!({ "Response": "Not Defined" }));
    }

    #[test]
    fn method_names_ignore_case() {
        assert_eq!(
            Method::parse("ClearManualSetpoint"),
            Some(Method::ClearManualSetPoint)
        );
        assert_eq!(Method::parse("readnow"), Some(Method::ReadNow));
        assert_eq!(Method::parse(""), None);
    }

    #[test]
    fn read_now_returns_telemetry_shape() {
        let mut thermostat = thermostat();
        let response = dispatch(&mut thermostat, "ReadNow", b"", monday(10, 0));

        assert_eq!(response.status, 200);
        assert_eq!(response.body["Temperature"], 20.0);
        assert_eq!(response.body["CurrentSetpoint"], 20.0);
        assert_eq!(response.body["IsHeaterOn"], false);
        assert_eq!(response.body["OverrideEnd"], 0);
        assert_eq!(response.body["Mode"], "SCHEDULE");
    }

    #[test]
    fn manual_setpoint_accepts_both_key_styles() {
        let mut thermostat = thermostat();
        let response = dispatch(
            &mut thermostat,
            "SetManualSetPoint",
            br#"{"setpoint": 22.0, "hours": 2}"#,
            monday(10, 0),
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.body["CurrentSetpoint"], 22.0);
        assert_eq!(response.body["OverrideEnd"], 7_200_000);
        assert_eq!(response.body["IsHeaterOn"], true);

        let response = dispatch(
            &mut thermostat,
            "SetManualSetPoint",
            br#"{"Setpoint": 21.0}"#,
            monday(10, 0),
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.body["OverrideEnd"], 4 * 3_600_000);
    }

    #[test]
    fn manual_setpoint_rejects_bad_input() {
        let mut thermostat = thermostat();
        let payloads: [&[u8]; 4] = [
            b"",
            br#"{"hours": 2}"#,
            br#"{"setpoint": 22.0, "hours": -1}"#,
            b"not json",
        ];
        for payload in payloads {
            let response = dispatch(&mut thermostat, "SetManualSetPoint", payload, monday(10, 0));
            assert_eq!(response.status, 400, "payload {payload:?}");
        }
        assert_eq!(thermostat.config().override_state, OverrideState::None);
    }

    #[test]
    fn away_and_back() {
        let mut thermostat = thermostat();
        let response = dispatch(&mut thermostat, "SetAwayOn", b"", monday(10, 0));
        assert_eq!(response.body["CurrentSetpoint"], 13.0);
        assert_eq!(response.body["Mode"], "AWAY");

        let response = dispatch(&mut thermostat, "SetAwayOff", b"", monday(10, 5));
        assert_eq!(response.body["CurrentSetpoint"], 20.0);
        assert_eq!(response.body["Mode"], "SCHEDULE");
    }

    #[test]
    fn command_is_saved_when_sensor_fails() {
        let mut thermostat = thermostat();
        thermostat
            .sensor_mut()
            .fail(SensorError::Stale { age_ms: 700_000 });

        let response = dispatch(&mut thermostat, "SetAwayOn", b"", monday(10, 0));
        assert_eq!(response.status, 503);
        assert_eq!(
            thermostat.store().saved().unwrap().override_state,
            OverrideState::Away { setpoint: 13.0 }
        );
    }

    #[test]
    fn storage_failure_is_500() {
        let mut thermostat = thermostat();
        thermostat.store().fail_saves(true);

        let response = dispatch(&mut thermostat, "ReadNow", b"", monday(10, 0));
        assert_eq!(response.status, 500);
        assert!(response.body["error"].as_str().unwrap().contains("disk full"));
    }

    #[test]
    fn program_round_trips_through_methods() {
        let mut thermostat = thermostat();
        let mut program: Program =
            serde_json::from_value(dispatch(&mut thermostat, "GetProgram", b"", monday(10, 0)).body)
                .unwrap();
        program.get_mut(&6).unwrap().get_mut(&9).unwrap().insert(0, 21.0);

        let wrapped = serde_json::to_vec(&json!({ "Program": program })).unwrap();
        let response = dispatch(&mut thermostat, "SetProgram", &wrapped, monday(10, 0));
        assert_eq!(response.status, 200);
        assert_eq!(response.body["6"]["9"]["0"], 21.0);

        let bare = serde_json::to_vec(&program).unwrap();
        let response = dispatch(&mut thermostat, "SetProgram", &bare, monday(10, 0));
        assert_eq!(response.status, 200);
    }

    #[test]
    fn incomplete_program_is_rejected() {
        let mut thermostat = thermostat();
        let mut program = thermostat.schedule();
        program.get_mut(&3).unwrap().remove(&12);

        let payload = serde_json::to_vec(&program).unwrap();
        let response = dispatch(&mut thermostat, "SetProgram", &payload, monday(10, 0));
        assert_eq!(response.status, 400);
        assert_eq!(thermostat.schedule().len(), 7);
        assert_eq!(thermostat.schedule()[&3].len(), 24);
    }

    #[test]
    fn history_filters_by_days() {
        let mut thermostat = thermostat();
        let start = monday(10, 0);
        for hours in [0, 20, 30] {
            thermostat.refresh(start + Duration::hours(hours)).unwrap();
        }
        let now = start + Duration::hours(30);

        let response = dispatch(&mut thermostat, "GetHistory", b"", now);
        assert_eq!(response.body["Readings"].as_array().unwrap().len(), 2);

        let response = dispatch(&mut thermostat, "GetHistory", br#"{"days": 2}"#, now);
        assert_eq!(response.body["Readings"].as_array().unwrap().len(), 3);

        let response = dispatch(&mut thermostat, "GetHistory", br#"{"days": 0}"#, now);
        assert_eq!(response.status, 400);
    }

    #[test]
    fn history_reports_heater_seconds() {
        let mut thermostat = thermostat();
        let start = monday(10, 0);
        thermostat.sensor_mut().set(19.0);
        for minutes in [0, 5, 10] {
            thermostat
                .refresh(start + Duration::minutes(minutes))
                .unwrap();
        }
        thermostat.sensor_mut().set(21.0);
        thermostat.refresh(start + Duration::minutes(15)).unwrap();

        let response = dispatch(
            &mut thermostat,
            "GetHistory",
            b"",
            start + Duration::minutes(20),
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.body["HeaterSeconds"], 600);
        assert_eq!(response.body["Readings"].as_array().unwrap().len(), 4);
    }
}
