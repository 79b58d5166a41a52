//! Wall-time source used by the engine.

use crate::utils::time::{from_minute_of_day, minute_of_day};
use chrono::{Local, NaiveDate, NaiveTime};

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;

    /// Current time of day, truncated to the minute.
    fn now(&self) -> NaiveTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> NaiveTime {
        from_minute_of_day(minute_of_day(Local::now().time()))
    }
}

/// Clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl FixedClock {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }

    fn now(&self) -> NaiveTime {
        from_minute_of_day(minute_of_day(self.time))
    }
}
