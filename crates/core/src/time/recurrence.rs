use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use super::{end_of_day, localize, TimeError};
use crate::domain::intent::Frequency;

const RRULE_PREFIX: &str = "RRULE:";
const UNTIL_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

pub fn parse_weekday_code(code: &str) -> Option<Weekday> {
    match code {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Builds an RFC 5545 rule such as `RRULE:FREQ=WEEKLY;BYDAY=TU;UNTIL=20260331T215959Z`.
///
/// `end_date` is the last local day that may hold an occurrence; UNTIL is its
/// local 23:59:59 expressed in UTC.
pub fn format_recurrence_rule(
    frequency: Frequency,
    day_of_week: Option<Weekday>,
    end_date: Option<NaiveDate>,
    tz: Tz,
) -> String {
    let mut rule = format!("{RRULE_PREFIX}FREQ={}", frequency.as_str());

    if let (Frequency::Weekly, Some(weekday)) = (frequency, day_of_week) {
        rule.push_str(";BYDAY=");
        rule.push_str(weekday_code(weekday));
    }

    if let Some(end_date) = end_date {
        rule.push_str(";UNTIL=");
        rule.push_str(&until_stamp(end_date, tz));
    }

    rule
}

/// Moves `date` forward (never backward) onto `weekday`.
pub fn align_weekly_start(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = date.weekday().num_days_from_monday();
    let target = weekday.num_days_from_monday();
    let offset = (7 + target - current) % 7;
    date.checked_add_days(Days::new(u64::from(offset))).unwrap_or(date)
}

/// First `count` occurrences of a series starting at `start`, `start` included.
///
/// Steps are taken on local wall-clock time so occurrences keep their hour
/// across DST changes. Monthly steps clamp to the end of shorter months.
pub fn next_occurrences(
    start: DateTime<Tz>,
    frequency: Frequency,
    count: usize,
) -> Vec<DateTime<Tz>> {
    let tz = start.timezone();
    let origin = start.naive_local();

    (0..count)
        .map_while(|step| {
            let step = u32::try_from(step).ok()?;
            let naive = match frequency {
                Frequency::Daily => origin.checked_add_days(Days::new(u64::from(step))),
                Frequency::Weekly => origin.checked_add_days(Days::new(u64::from(step) * 7)),
                Frequency::Monthly => origin.checked_add_months(Months::new(step)),
            }?;
            Some(localize(naive, tz))
        })
        .collect()
}

/// Ends a series before `cutover`: UNTIL becomes the local end of the
/// previous day. Every other rule component is kept as is.
pub fn trim_rule_before(rule: &str, cutover: NaiveDate, tz: Tz) -> Result<String, TimeError> {
    let body = rule
        .trim()
        .strip_prefix(RRULE_PREFIX)
        .ok_or_else(|| TimeError::NotAnRrule(rule.to_owned()))?;

    let last_day = cutover.pred_opt().unwrap_or(cutover);
    let until = format!("UNTIL={}", until_stamp(last_day, tz));

    let mut replaced = false;
    let mut parts = body
        .split(';')
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.starts_with("UNTIL=") {
                replaced = true;
                until.clone()
            } else {
                part.to_owned()
            }
        })
        .collect::<Vec<_>>();

    if !replaced {
        parts.push(until);
    }

    Ok(format!("{RRULE_PREFIX}{}", parts.join(";")))
}

fn until_stamp(date: NaiveDate, tz: Tz) -> String {
    end_of_day(date, tz).with_timezone(&Utc).format(UNTIL_FORMAT).to_string()
}
