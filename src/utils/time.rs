//! Time utilities for time-of-day triggers and timezone handling

use chrono::{DateTime, LocalResult, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::time::Duration;

/// Accepted formats for a configured start time.
const TIME_OF_DAY_FORMATS: [&str; 2] = ["%H:%M", "%H:%M:%S"];

/// A daily wall-clock trigger in a named timezone, e.g. `07:00` in
/// `America/Chicago`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    time: NaiveTime,
    timezone: Tz,
}

impl DailyTrigger {
    /// Parse a time-of-day string (`HH:MM` or `HH:MM:SS`) and an IANA timezone
    /// name.
    pub fn parse(time: &str, timezone: &str) -> Result<Self, String> {
        let time = parse_time_of_day(time)?;
        let timezone = parse_timezone(timezone)?;
        Ok(Self { time, timezone })
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The first trigger instant strictly after `now`.
    ///
    /// Local times that fall into a DST gap are skipped to the following day;
    /// ambiguous local times (DST fold) resolve to the earlier instant.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_date = now.with_timezone(&self.timezone).date_naive();

        for day_offset in 0..=2 {
            let naive = (local_date + chrono::Duration::days(day_offset)).and_time(self.time);
            let candidate = match self.timezone.from_local_datetime(&naive) {
                LocalResult::Single(dt) => dt,
                LocalResult::Ambiguous(earliest, _) => earliest,
                LocalResult::None => continue,
            };

            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }

        now + chrono::Duration::days(1)
    }

    /// How long to sleep from `now` until the next trigger.
    pub fn duration_until_next(&self, now: DateTime<Utc>) -> Duration {
        (self.next_after(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for DailyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time.format("%H:%M"), self.timezone)
    }
}

/// Parse a time-of-day string like "07:00" or "18:30:15"
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, String> {
    let value = value.trim();
    TIME_OF_DAY_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
        .ok_or_else(|| {
            format!(
                "Invalid start time: '{}'. Expected format like '07:00' or '07:00:30'",
                value
            )
        })
}

/// Parse a named timezone (e.g. "America/Chicago")
pub fn parse_timezone(value: &str) -> Result<Tz, String> {
    value.trim().parse::<Tz>().map_err(|_| {
        format!(
            "Invalid timezone: '{}'. Use a named timezone (e.g., 'Europe/London')",
            value
        )
    })
}
