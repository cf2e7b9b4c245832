//! Conversions between local wall-clock time and instants in a named zone.
//!
//! Every helper here is total: a local time that falls into a DST gap is
//! moved forward past the gap and an ambiguous local time resolves to the
//! earlier instant.

pub mod format;
pub mod recurrence;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("unknown IANA timezone `{0}`")]
    UnknownTimezone(String),
    #[error("recurrence rule `{0}` is not an RRULE")]
    NotAnRrule(String),
}

pub fn parse_timezone(name: &str) -> Result<Tz, TimeError> {
    name.trim().parse::<Tz>().map_err(|_| TimeError::UnknownTimezone(name.to_owned()))
}

pub fn local_now(now: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    now.with_timezone(&tz)
}

pub fn today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    local_now(now, tz).date_naive()
}

/// Today when `time` is still ahead of the local clock, tomorrow otherwise.
pub fn resolve_implicit_date(time: NaiveTime, now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    let local = local_now(now, tz);
    let date = local.date_naive();
    if local.time() < time {
        date
    } else {
        date.succ_opt().unwrap_or(date)
    }
}

pub fn combine(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Tz> {
    localize(date.and_time(time), tz)
}

pub fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // Gaps are at most two hours in every zone in the database.
            for shift in [30, 60, 90, 120] {
                if let LocalResult::Single(instant) =
                    tz.from_local_datetime(&(naive + Duration::minutes(shift)))
                {
                    return instant;
                }
            }
            tz.from_utc_datetime(&naive)
        }
    }
}

pub fn add_duration(instant: DateTime<Tz>, minutes: i64) -> DateTime<Tz> {
    instant + Duration::minutes(minutes)
}

pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    combine(date, NaiveTime::MIN, tz)
}

/// Local 23:59:59 of `date`.
pub fn end_of_day(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    combine(date, last_second(), tz)
}

pub fn minutes_between(start: NaiveTime, end: NaiveTime) -> i64 {
    (end - start).num_minutes()
}

fn last_second() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
    use chrono_tz::Europe::Berlin;

    use super::{combine, end_of_day, parse_timezone, resolve_implicit_date, TimeError};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    #[test]
    fn implicit_date_rolls_over_once_time_has_passed() {
        // 09:30 local in Berlin (CET, UTC+1).
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).single().expect("valid timestamp");

        assert_eq!(resolve_implicit_date(time(10, 0), now, Berlin), date(2026, 3, 2));
        assert_eq!(resolve_implicit_date(time(9, 30), now, Berlin), date(2026, 3, 3));
        assert_eq!(resolve_implicit_date(time(8, 0), now, Berlin), date(2026, 3, 3));
    }

    #[test]
    fn combine_shifts_gap_times_forward() {
        // 2026-03-29 02:30 does not exist in Berlin.
        let instant = combine(date(2026, 3, 29), time(2, 30), Berlin);

        assert_eq!(instant.hour(), 3);
        assert_eq!(instant.minute(), 0);
        assert_eq!(instant.timezone(), Berlin);
    }

    #[test]
    fn combine_picks_earlier_instant_when_ambiguous() {
        // 2026-10-25 02:30 happens twice in Berlin; the first is still CEST.
        let instant = combine(date(2026, 10, 25), time(2, 30), Berlin);
        let expected = Utc.with_ymd_and_hms(2026, 10, 25, 0, 30, 0).single().expect("valid");

        assert_eq!(instant.with_timezone(&Utc), expected);
    }

    #[test]
    fn end_of_day_is_last_local_second() {
        let instant = end_of_day(date(2026, 3, 31), Berlin).with_timezone(&Utc);
        let expected = Utc.with_ymd_and_hms(2026, 3, 31, 21, 59, 59).single().expect("valid");

        assert_eq!(instant, expected);
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert!(parse_timezone("Europe/Berlin").is_ok());
        assert_eq!(
            parse_timezone("Mars/Olympus"),
            Err(TimeError::UnknownTimezone("Mars/Olympus".to_owned()))
        );
    }
}
