use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

/// A calendar month in UTC - the accounting period of the quota ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Returns `None` unless `month` is in `1..=12` and the year is
    /// representable.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)?;
        // the following month must exist too, for `end()`
        if month == 12 {
            NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?;
        }
        Some(Self { year, month })
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First instant of the month, saturating at the last representable
    /// instant for the month after chrono's maximum date.
    pub fn start(&self) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// First instant of the following month, i.e. when the counter resets.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    /// Whole seconds from `now` until the end of this month, never negative.
    pub fn seconds_until_end(&self, now: DateTime<Utc>) -> u64 {
        (self.end() - now).num_seconds().max(0) as u64
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}
