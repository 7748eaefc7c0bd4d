//! Cron schedules.

use chrono::{DateTime, Local, Utc};
use cron::Schedule;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A parsed cron expression.
///
/// Accepts standard five-field expressions (minute precision), the six and
/// seven field forms with a leading seconds field, and macros such as
/// `@hourly`. Fields are evaluated in the local time zone.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let normalized = if trimmed.split_whitespace().count() == 5 {
            format!("0 {}", trimmed)
        } else {
            trimmed.to_string()
        };

        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            Error::InvalidSchedule(format!("{}: {}", expression, e))
        })?;

        Ok(Self {
            expression: trimmed.to_string(),
            schedule,
        })
    }

    /// The expression as written.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&Local))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for CronSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Timelike};

    #[test]
    fn test_every_minute_on_boundary_is_strictly_later() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let boundary = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();

        let next = schedule.next_after(boundary).unwrap();
        assert!(next > boundary);
        assert_eq!(next, boundary + Duration::minutes(1));
    }

    #[test]
    fn test_every_minute_mid_minute() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 17).unwrap();

        let next = schedule.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 12, 31, 0).unwrap());
    }

    #[test]
    fn test_seconds_field_accepted() {
        let schedule = CronSchedule::parse("*/10 * * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 10).unwrap();

        let next = schedule.next_after(now).unwrap();
        assert_eq!(next.second(), 20);
    }

    #[test]
    fn test_macro_accepted() {
        let schedule = CronSchedule::parse("@hourly").unwrap();
        assert_eq!(schedule.expression(), "@hourly");
        assert!(schedule.next_after(Utc::now()).is_some());
    }

    #[test]
    fn test_invalid_expression_rejected() {
        let result = CronSchedule::parse("not a cron");
        assert!(matches!(result, Err(Error::InvalidSchedule(_))));

        let result = CronSchedule::parse("61 * * * *");
        assert!(result.is_err());
    }
}
