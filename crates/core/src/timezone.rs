//! Zone-aware helpers for "now", local midnight, and calendar date parsing.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Calendar date layout accepted in query strings.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
#[error("expected a YYYY-MM-DD date, got '{0}'")]
pub struct InvalidDate(pub String);

/// Resolve an IANA zone name. Empty or unknown names fall back to `default`.
pub fn resolve_zone(name: &str, default: Tz) -> Tz {
    let name = name.trim();
    if name.is_empty() {
        return default;
    }
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::debug!(timezone = %name, fallback = %default, "Unknown timezone, using default");
            default
        }
    }
}

pub fn now_in(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

/// Local midnight of the day containing `t`, in `t`'s zone.
pub fn start_of_day(t: &DateTime<Tz>) -> DateTime<Tz> {
    local_midnight(t.date_naive(), t.timezone())
}

/// First instant of `date` in `tz`.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    resolve_local(date.and_time(NaiveTime::MIN), tz)
}

/// Parse a `YYYY-MM-DD` string as local midnight in `tz`.
pub fn parse_date_in(value: &str, tz: Tz) -> Result<DateTime<Tz>, InvalidDate> {
    // chrono accepts unpadded fields; the wire format does not
    if value.len() != 10 {
        return Err(InvalidDate(value.to_string()));
    }
    let date = NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| InvalidDate(value.to_string()))?;
    Ok(local_midnight(date, tz))
}

/// Map a wall-clock time to an instant. Ambiguous times take the earlier
/// instant; times inside a DST gap are shifted forward past the gap.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let before = tz
                .offset_from_utc_datetime(&(naive - Duration::days(1)))
                .fix();
            let utc = naive - Duration::seconds(i64::from(before.local_minus_utc()));
            tz.from_utc_datetime(&utc)
        }
    }
}
