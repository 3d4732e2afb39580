use std::collections::VecDeque;

use chrono::{DateTime, FixedOffset};

use crate::types::Reading;

/// One week of readings at the default five minute cadence.
pub const DEFAULT_HISTORY_CAPACITY: usize = 2016;

/// Bounded log of recent readings, oldest first.
#[derive(Debug, Clone)]
pub struct ReadingHistory {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl Default for ReadingHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ReadingHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            readings: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
        }
    }

    pub fn push(&mut self, reading: Reading) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(reading);
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.readings.back()
    }

    pub fn since(&self, cutoff: DateTime<FixedOffset>) -> impl Iterator<Item = &Reading> {
        self.readings
            .iter()
            .filter(move |reading| reading.timestamp >= cutoff)
    }

    /// Heater seconds observed since `cutoff`.
    ///
    /// Each heating run contributes the runtime of its last reading, capped to
    /// the part of the run that falls after the cutoff.
    pub fn heater_seconds_since(&self, cutoff: DateTime<FixedOffset>) -> u64 {
        let mut total = 0;
        let mut run: Option<&Reading> = None;
        for reading in self.since(cutoff) {
            if reading.heater_is_on {
                run = Some(reading);
            } else if let Some(last) = run.take() {
                total += run_after(last, cutoff);
            }
        }
        total + run.map_or(0, |last| run_after(last, cutoff))
    }
}

fn run_after(last: &Reading, cutoff: DateTime<FixedOffset>) -> u64 {
    let window = (last.timestamp - cutoff).num_seconds().max(0) as u64;
    last.heater_run_seconds.min(window)
}
