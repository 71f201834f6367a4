//! Time source for "today" and event timestamps
//!
//! Completion state is keyed on the local calendar date, so every service
//! takes a [`Clock`] instead of reading the system time directly.

use chrono::{DateTime, Local, NaiveDate, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    /// Current date in the user's local calendar
    fn today(&self) -> NaiveDate;

    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time in the process's local timezone
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock pinned to noon UTC on `date`
    pub fn on(date: NaiveDate) -> Self {
        let noon = date
            .and_hms_opt(12, 0, 0)
            .unwrap_or_default()
            .and_utc();
        Self::new(noon)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance_days(&self, days: i64) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += chrono::Duration::days(days);
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}
