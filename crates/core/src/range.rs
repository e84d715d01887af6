//! Resolution of the reporting window from `period` / `start_date` / `end_date`.

use crate::error::UsageError;
use crate::timezone;
use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::Deserialize;

/// Named relative window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Period {
    #[default]
    Today,
    Week,
    Month,
}

impl Period {
    /// Unrecognized values silently mean `Today`.
    pub fn parse(value: &str) -> Self {
        match value {
            "week" => Self::Week,
            "month" => Self::Month,
            _ => Self::Today,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

/// Inclusive `[start, end]` window in the caller's zone.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl TimeRange {
    pub fn contains<Z: chrono::TimeZone>(&self, t: &DateTime<Z>) -> bool {
        *t >= self.start && *t <= self.end
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RangeQuery {
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl RangeQuery {
    /// Both dates must be non-empty to select a custom range.
    fn custom_dates(&self) -> Option<(&str, &str)> {
        match (self.start_date.as_deref(), self.end_date.as_deref()) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => Some((start, end)),
            _ => None,
        }
    }

    pub fn period(&self) -> Period {
        self.period.as_deref().map(Period::parse).unwrap_or_default()
    }

    /// Resolve the window relative to `now`; the zone of `now` is the
    /// zone used for calendar arithmetic and date parsing.
    pub fn resolve(&self, now: DateTime<Tz>) -> Result<TimeRange, UsageError> {
        let tz = now.timezone();

        if let Some((start_raw, end_raw)) = self.custom_dates() {
            let start = timezone::parse_date_in(start_raw, tz).map_err(|_| {
                UsageError::InvalidDateFormat {
                    field: "start_date",
                }
            })?;
            let end_day = timezone::parse_date_in(end_raw, tz)
                .map_err(|_| UsageError::InvalidDateFormat { field: "end_date" })?
                .date_naive();
            let next_day = end_day
                .succ_opt()
                .ok_or(UsageError::InvalidDateFormat { field: "end_date" })?;
            let end = timezone::local_midnight(next_day, tz) - Duration::nanoseconds(1);
            return Ok(TimeRange { start, end });
        }

        // Week and month step back in wall-clock time, then map to an instant
        let local = now.naive_local();
        let shifted = |naive: Option<NaiveDateTime>| {
            naive
                .map(|naive| timezone::resolve_local(naive, tz))
                .ok_or_else(|| UsageError::Internal("usage window is out of calendar range".into()))
        };
        let start = match self.period() {
            Period::Today => timezone::start_of_day(&now),
            Period::Week => shifted(local.checked_sub_days(Days::new(7)))?,
            Period::Month => shifted(months_back(local, 1))?,
        };
        Ok(TimeRange { start, end: now })
    }
}

/// Step a wall-clock time back by whole months, keeping day and time of day.
/// A day past the end of the target month carries into the next one, so
/// Mar 31 minus one month is Mar 2 (leap year) or Mar 3.
fn months_back(local: NaiveDateTime, months: u32) -> Option<NaiveDateTime> {
    let date = local.date();
    let index = date.year() * 12 + date.month0() as i32 - months as i32;
    let first = NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)?;
    let day = first.checked_add_days(Days::new(u64::from(date.day0())))?;
    Some(day.and_time(local.time()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(tz: Tz, y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        tz.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn query(period: Option<&str>, start: Option<&str>, end: Option<&str>) -> RangeQuery {
        RangeQuery {
            period: period.map(String::from),
            start_date: start.map(String::from),
            end_date: end.map(String::from),
        }
    }

    #[test]
    fn test_period_parse() {
        assert_eq!(Period::parse("today"), Period::Today);
        assert_eq!(Period::parse("week"), Period::Week);
        assert_eq!(Period::parse("month"), Period::Month);
        assert_eq!(Period::parse("bogus"), Period::Today);
        assert_eq!(Period::parse("WEEK"), Period::Today);
        assert_eq!(Period::parse(""), Period::Today);
    }

    #[test]
    fn test_today_is_start_of_local_day_to_now() {
        let now = at(Tz::Asia__Shanghai, 2024, 3, 15, 9, 30);
        let range = query(Some("today"), None, None).resolve(now).unwrap();
        assert_eq!(range.start, at(Tz::Asia__Shanghai, 2024, 3, 15, 0, 0));
        assert_eq!(range.end, now);
    }

    #[test]
    fn test_default_period_is_today() {
        let now = at(Tz::UTC, 2024, 3, 15, 9, 30);
        let range = RangeQuery::default().resolve(now).unwrap();
        assert_eq!(range.start, at(Tz::UTC, 2024, 3, 15, 0, 0));
        assert_eq!(range.end, now);
    }

    #[test]
    fn test_unknown_period_matches_today() {
        let now = at(Tz::Europe__Paris, 2024, 7, 4, 18, 5);
        let bogus = query(Some("bogus"), None, None).resolve(now).unwrap();
        let today = query(Some("today"), None, None).resolve(now).unwrap();
        assert_eq!(bogus, today);
    }

    #[test]
    fn test_week_and_month_are_calendar_offsets() {
        let now = at(Tz::UTC, 2024, 3, 31, 12, 0);
        let week = query(Some("week"), None, None).resolve(now).unwrap();
        assert_eq!(week.start, at(Tz::UTC, 2024, 3, 24, 12, 0));
        assert_eq!(week.end, now);

        let month = query(Some("month"), None, None).resolve(now).unwrap();
        assert_eq!(month.start, at(Tz::UTC, 2024, 3, 2, 12, 0));
        assert_eq!(month.end, now);
    }

    #[test]
    fn test_month_overflow_carries_forward() {
        // Feb 31 does not exist and becomes Mar 2 (2024) or Mar 3 (2023)
        let month = query(Some("month"), None, None)
            .resolve(at(Tz::UTC, 2024, 3, 31, 8, 0))
            .unwrap();
        assert_eq!(month.start, at(Tz::UTC, 2024, 3, 2, 8, 0));

        let month = query(Some("month"), None, None)
            .resolve(at(Tz::UTC, 2023, 3, 31, 8, 0))
            .unwrap();
        assert_eq!(month.start, at(Tz::UTC, 2023, 3, 3, 8, 0));

        // May 31 -> Apr 31 -> May 1
        let month = query(Some("month"), None, None)
            .resolve(at(Tz::UTC, 2024, 5, 31, 8, 0))
            .unwrap();
        assert_eq!(month.start, at(Tz::UTC, 2024, 5, 1, 8, 0));
    }

    #[test]
    fn test_month_crosses_year_boundary() {
        let month = query(Some("month"), None, None)
            .resolve(at(Tz::UTC, 2024, 1, 15, 8, 0))
            .unwrap();
        assert_eq!(month.start, at(Tz::UTC, 2023, 12, 15, 8, 0));
    }

    #[test]
    fn test_week_and_month_landing_in_dst_gap() {
        // Havana skips 00:00-00:59 on 2024-03-10; 00:30 becomes 01:30 CDT
        let gap_exit = Utc
            .with_ymd_and_hms(2024, 3, 10, 5, 30, 0)
            .unwrap()
            .with_timezone(&Tz::America__Havana);
        assert_eq!(gap_exit, at(Tz::America__Havana, 2024, 3, 10, 1, 30));

        let now = at(Tz::America__Havana, 2024, 3, 17, 0, 30);
        let week = query(Some("week"), None, None).resolve(now).unwrap();
        assert_eq!(week.start, gap_exit);
        assert_eq!(week.end, now);

        let now = at(Tz::America__Havana, 2024, 4, 10, 0, 30);
        let month = query(Some("month"), None, None).resolve(now).unwrap();
        assert_eq!(month.start, gap_exit);
    }

    #[test]
    fn test_week_keeps_wall_clock_across_dst() {
        // US DST began 2024-03-10; a calendar week back keeps 12:00 local
        let now = at(Tz::America__New_York, 2024, 3, 14, 12, 0);
        let week = query(Some("week"), None, None).resolve(now).unwrap();
        assert_eq!(week.start, at(Tz::America__New_York, 2024, 3, 7, 12, 0));
    }

    #[test]
    fn test_custom_range_end_is_inclusive_of_last_day() {
        let now = at(Tz::Asia__Shanghai, 2024, 5, 1, 10, 0);
        let range = query(None, Some("2024-01-01"), Some("2024-01-31"))
            .resolve(now)
            .unwrap();
        assert_eq!(range.start, at(Tz::Asia__Shanghai, 2024, 1, 1, 0, 0));
        assert_eq!(
            range.end,
            at(Tz::Asia__Shanghai, 2024, 2, 1, 0, 0) - Duration::nanoseconds(1)
        );
        assert_eq!(
            range.end.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 1, 31, 15, 59, 59).unwrap()
                + Duration::nanoseconds(999_999_999)
        );
    }

    #[test]
    fn test_custom_range_overrides_period() {
        let now = at(Tz::UTC, 2024, 5, 1, 10, 0);
        let range = query(Some("week"), Some("2024-04-01"), Some("2024-04-01"))
            .resolve(now)
            .unwrap();
        assert_eq!(range.start, at(Tz::UTC, 2024, 4, 1, 0, 0));
        assert_eq!(range.end, at(Tz::UTC, 2024, 4, 2, 0, 0) - Duration::nanoseconds(1));
    }

    #[test]
    fn test_single_date_falls_back_to_period() {
        let now = at(Tz::UTC, 2024, 5, 1, 10, 0);
        let range = query(Some("week"), Some("2024-04-01"), None)
            .resolve(now)
            .unwrap();
        assert_eq!(range.start, at(Tz::UTC, 2024, 4, 24, 10, 0));

        let range = query(None, Some("2024-04-01"), Some("")).resolve(now).unwrap();
        assert_eq!(range.start, at(Tz::UTC, 2024, 5, 1, 0, 0));
    }

    #[test]
    fn test_malformed_dates() {
        let now = at(Tz::UTC, 2024, 5, 1, 10, 0);
        let err = query(None, Some("2024/01/01"), Some("2024-01-31"))
            .resolve(now)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid start_date format, use YYYY-MM-DD");

        let err = query(None, Some("2024-01-01"), Some("31-01-2024"))
            .resolve(now)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid end_date format, use YYYY-MM-DD");
    }

    #[test]
    fn test_contains_is_inclusive() {
        let range = TimeRange {
            start: at(Tz::UTC, 2024, 1, 1, 0, 0),
            end: at(Tz::UTC, 2024, 1, 2, 0, 0),
        };
        assert!(range.contains(&Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert!(range.contains(&Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()));
        assert!(!range.contains(&Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 1).unwrap()));
    }
}
