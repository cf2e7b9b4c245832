//! German rendering of dates and times for chat replies.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};

const MONTHS: [&str; 12] = [
    "Jan.", "Feb.", "März", "Apr.", "Mai", "Juni", "Juli", "Aug.", "Sept.", "Okt.", "Nov.", "Dez.",
];

pub fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Montag",
        Weekday::Tue => "Dienstag",
        Weekday::Wed => "Mittwoch",
        Weekday::Thu => "Donnerstag",
        Weekday::Fri => "Freitag",
        Weekday::Sat => "Samstag",
        Weekday::Sun => "Sonntag",
    }
}

pub fn date_day_name(date: NaiveDate) -> &'static str {
    day_name(date.weekday())
}

/// `HH:MM`
pub fn format_time(time: NaiveTime) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

/// `dd.MM`
pub fn format_day_month(date: NaiveDate) -> String {
    format!("{:02}.{:02}", date.day(), date.month())
}

/// `dd.MM.yyyy`
pub fn format_full_date(date: NaiveDate) -> String {
    format!("{:02}.{:02}.{}", date.day(), date.month(), date.year())
}

/// `d. MMM`, e.g. `3. März`
pub fn format_short_date(date: NaiveDate) -> String {
    let month = MONTHS[date.month0() as usize];
    format!("{}. {month}", date.day())
}
