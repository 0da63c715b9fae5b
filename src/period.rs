//! Report periods and budget month boundaries

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Aggregation window of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "w")]
    Week,
    #[serde(rename = "m")]
    Month,
    #[serde(rename = "y")]
    Year,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Week, Period::Month, Period::Year];

    /// Short tag used in cache keys and report requests
    pub fn tag(self) -> &'static str {
        match self {
            Period::Week => "w",
            Period::Month => "m",
            Period::Year => "y",
        }
    }

    /// Start of the rolling window ending at `now`
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            Period::Week => now.checked_sub_signed(TimeDelta::days(7)),
            Period::Month => now.checked_sub_months(Months::new(1)),
            Period::Year => now.checked_sub_months(Months::new(12)),
        };
        start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Period name as used in report headings
    pub fn title(self) -> &'static str {
        match self {
            Period::Week => "неделю",
            Period::Month => "месяц",
            Period::Year => "год",
        }
    }
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

/// First day of the month after the one containing `date`
///
/// December rolls over into January of the following year.
pub fn next_month_start(date: NaiveDate) -> NaiveDate {
    month_start(date)
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX)
}

/// Midnight UTC at the start of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
