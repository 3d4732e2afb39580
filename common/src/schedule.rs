use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValidationError};

pub const DAYS: usize = 7;
pub const HOURS: usize = 24;
pub const QUARTERS: usize = 4;
pub const CELLS: usize = DAYS * HOURS * QUARTERS;

pub const NIGHT_SETPOINT_C: f64 = 18.0;
pub const DAY_SETPOINT_C: f64 = 20.0;
const DAY_START_HOUR: usize = 7;
const DAY_END_HOUR: usize = 22;

/// Wire form of a schedule: weekday -> hour -> quarter -> temperature (°C).
/// Keys travel as decimal strings in JSON.
pub type Program = BTreeMap<u8, BTreeMap<u8, BTreeMap<u8, f64>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn index(self) -> usize {
        match self {
            Self::Mon => 0,
            Self::Tue => 1,
            Self::Wed => 2,
            Self::Thu => 3,
            Self::Fri => 4,
            Self::Sat => 5,
            Self::Sun => 6,
        }
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }
}

/// Weekly grid of target temperatures at quarter-hour resolution.
///
/// Every one of the 7×24×4 cells is always defined: the only ways to build a
/// schedule are [`Schedule::default`] and the validating conversion from a
/// [`Program`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Program", into = "Program")]
pub struct Schedule {
    grid: [[[f64; QUARTERS]; HOURS]; DAYS],
}

impl Default for Schedule {
    fn default() -> Self {
        let mut grid = [[[NIGHT_SETPOINT_C; QUARTERS]; HOURS]; DAYS];
        for day in grid.iter_mut() {
            for hour in &mut day[DAY_START_HOUR..DAY_END_HOUR] {
                *hour = [DAY_SETPOINT_C; QUARTERS];
            }
        }
        Self { grid }
    }
}

impl Schedule {
    pub fn lookup(&self, weekday: usize, hour: usize, quarter: usize) -> Result<f64, ConfigError> {
        self.grid
            .get(weekday)
            .and_then(|day| day.get(hour))
            .and_then(|hour| hour.get(quarter))
            .copied()
            .ok_or(ConfigError::CellOutOfRange {
                weekday,
                hour,
                quarter,
            })
    }

    /// Target for the local wall-clock time of `now`.
    pub fn at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<f64, ConfigError> {
        let weekday = DayOfWeek::from_chrono(now.weekday()).index();
        self.lookup(weekday, now.hour() as usize, (now.minute() / 15) as usize)
    }

    /// Swaps in a complete program. A partial program is rejected and the
    /// current schedule is left untouched.
    pub fn replace(&mut self, program: Program) -> Result<(), ValidationError> {
        *self = Self::try_from(program)?;
        Ok(())
    }

    pub fn to_program(&self) -> Program {
        let mut program = Program::new();
        for (weekday, day) in self.grid.iter().enumerate() {
            let hours = program.entry(weekday as u8).or_default();
            for (hour, quarters) in day.iter().enumerate() {
                let cells = hours.entry(hour as u8).or_default();
                for (quarter, temperature) in quarters.iter().enumerate() {
                    cells.insert(quarter as u8, *temperature);
                }
            }
        }
        program
    }
}

impl TryFrom<Program> for Schedule {
    type Error = ValidationError;

    fn try_from(program: Program) -> Result<Self, Self::Error> {
        for (&weekday, hours) in &program {
            if weekday as usize >= DAYS {
                return Err(ValidationError::UnexpectedKey(format!("weekday {weekday}")));
            }
            for (&hour, quarters) in hours {
                if hour as usize >= HOURS {
                    return Err(ValidationError::UnexpectedKey(format!(
                        "weekday {weekday} hour {hour}"
                    )));
                }
                if let Some(&quarter) = quarters.keys().find(|&&q| q as usize >= QUARTERS) {
                    return Err(ValidationError::UnexpectedKey(format!(
                        "weekday {weekday} hour {hour} quarter {quarter}"
                    )));
                }
            }
        }

        let mut grid = [[[0.0; QUARTERS]; HOURS]; DAYS];
        for (weekday, day) in grid.iter_mut().enumerate() {
            for (hour, quarters) in day.iter_mut().enumerate() {
                for (quarter, cell) in quarters.iter_mut().enumerate() {
                    let (weekday, hour, quarter) = (weekday as u8, hour as u8, quarter as u8);
                    let temperature = program
                        .get(&weekday)
                        .and_then(|hours| hours.get(&hour))
                        .and_then(|quarters| quarters.get(&quarter))
                        .copied()
                        .ok_or(ValidationError::MissingCell {
                            weekday,
                            hour,
                            quarter,
                        })?;
                    if !temperature.is_finite() {
                        return Err(ValidationError::NonFiniteTemperature {
                            weekday,
                            hour,
                            quarter,
                        });
                    }
                    *cell = temperature;
                }
            }
        }

        Ok(Self { grid })
    }
}

impl From<Schedule> for Program {
    fn from(schedule: Schedule) -> Self {
        schedule.to_program()
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;
    use pretty_assertions::assert_eq;

    use super::*;

    fn fixed_time(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, day, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn default_schedule_follows_day_night_pattern() {
        let schedule = Schedule::default();
        for weekday in 0..DAYS {
            for hour in 0..HOURS {
                for quarter in 0..QUARTERS {
                    let expected = if (7..22).contains(&hour) { 20.0 } else { 18.0 };
                    assert_eq!(schedule.lookup(weekday, hour, quarter), Ok(expected));
                }
            }
        }
    }

    #[test]
    fn lookup_outside_grid_is_config_error() {
        let schedule = Schedule::default();
        assert_eq!(
            schedule.lookup(7, 0, 0),
            Err(ConfigError::CellOutOfRange {
                weekday: 7,
                hour: 0,
                quarter: 0
            })
        );
        assert!(schedule.lookup(0, 24, 0).is_err());
        assert!(schedule.lookup(0, 0, 4).is_err());
    }

    #[test]
    fn at_uses_monday_based_weekday_and_quarter() {
        let mut program = Schedule::default().to_program();
        // Jan 6, 2026 is a Tuesday.
        program.get_mut(&1).unwrap().get_mut(&8).unwrap().insert(2, 21.5);
        let schedule = Schedule::try_from(program).unwrap();

        assert_eq!(schedule.at(&fixed_time(6, 8, 30)), Ok(21.5));
        assert_eq!(schedule.at(&fixed_time(6, 8, 44)), Ok(21.5));
        assert_eq!(schedule.at(&fixed_time(6, 8, 45)), Ok(20.0));
        assert_eq!(schedule.at(&fixed_time(5, 8, 30)), Ok(20.0));
    }

    #[test]
    fn replace_rejects_missing_cell_and_keeps_current() {
        let mut program = Schedule::default().to_program();
        program.get_mut(&3).unwrap().get_mut(&12).unwrap().remove(&1);

        let mut schedule = Schedule::default();
        let err = schedule.replace(program).unwrap_err();

        assert_eq!(
            err,
            ValidationError::MissingCell {
                weekday: 3,
                hour: 12,
                quarter: 1
            }
        );
        assert_eq!(schedule, Schedule::default());
    }

    #[test]
    fn replace_rejects_every_single_missing_cell() {
        let full = Schedule::default().to_program();
        let mut rejected = 0;
        for weekday in 0..DAYS as u8 {
            for hour in 0..HOURS as u8 {
                for quarter in 0..QUARTERS as u8 {
                    let mut program = full.clone();
                    program
                        .get_mut(&weekday)
                        .unwrap()
                        .get_mut(&hour)
                        .unwrap()
                        .remove(&quarter);
                    if Schedule::try_from(program).is_err() {
                        rejected += 1;
                    }
                }
            }
        }
        assert_eq!(rejected, CELLS);
    }

    #[test]
    fn replace_rejects_missing_day_and_extra_keys() {
        let mut program = Schedule::default().to_program();
        program.remove(&6);
        assert!(matches!(
            Schedule::try_from(program),
            Err(ValidationError::MissingCell { weekday: 6, .. })
        ));

        let mut program = Schedule::default().to_program();
        program.get_mut(&0).unwrap().get_mut(&0).unwrap().insert(4, 19.0);
        assert!(matches!(
            Schedule::try_from(program),
            Err(ValidationError::UnexpectedKey(_))
        ));
    }

    #[test]
    fn replace_rejects_non_finite_temperature() {
        let mut program = Schedule::default().to_program();
        program.get_mut(&2).unwrap().get_mut(&5).unwrap().insert(0, f64::NAN);
        assert_eq!(
            Schedule::try_from(program),
            Err(ValidationError::NonFiniteTemperature {
                weekday: 2,
                hour: 5,
                quarter: 0
            })
        );
    }

    #[test]
    fn serializes_as_nested_string_keyed_map() {
        let json = serde_json::to_value(Schedule::default()).unwrap();
        assert_eq!(json["0"]["6"]["3"], 18.0);
        assert_eq!(json["6"]["7"]["0"], 20.0);
        assert_eq!(json["6"]["21"]["3"], 20.0);
        assert_eq!(json["6"]["22"]["0"], 18.0);

        let back: Schedule = serde_json::from_value(json).unwrap();
        assert_eq!(back, Schedule::default());
    }

    #[test]
    fn deserializing_partial_schedule_fails() {
        let raw = r#"{"0": {"0": {"0": 18.0}}}"#;
        assert!(serde_json::from_str::<Schedule>(raw).is_err());
    }
}
