//! Fixed German reply texts and the formatting of calendar results.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use famcal_core::calendar::CalendarError;
use famcal_core::domain::event::{CalendarEvent, EventTiming};
use famcal_core::domain::intent::{Frequency, Recurrence};
use famcal_core::time::format::{
    date_day_name, day_name, format_day_month, format_full_date, format_short_date, format_time,
};

pub const HELP_TEXT: &str = "Ich bin euer Familienkalender-Bot. Das kann ich:\n\
- Termine anzeigen: \"Was steht heute an?\", \"Was ist am Wochenende los?\"\n\
- Termine eintragen: \"Zahnarzt am Montag um 10 Uhr\", \"Urlaub vom 3. bis 7. August\"\n\
- Serien anlegen: \"Jeden Dienstag 17 Uhr Schwimmen\"\n\
- Termine verschieben: \"Verschieb den Zahnarzt auf 14 Uhr\"\n\
- Termine löschen: \"Lösch das Training am Freitag\"\n\
Mit \"abbrechen\" fängst du jederzeit von vorne an.";
pub const CANCELLED: &str = "Alles klar, was kann ich für dich tun?";
pub const UNKNOWN_SENDER: &str = "Entschuldigung, ich bin ein privater Familienbot und kann nur \
mit registrierten Familienmitgliedern kommunizieren.";
pub const NON_TEXT: &str = "Ich kann leider nur Textnachrichten verarbeiten.";

pub const GENERIC_FALLBACK: &str = "Das hab ich nicht ganz verstanden. Schreib mir einfach, was \
du mit dem Kalender machen möchtest!";
pub const UPDATE_FALLBACK: &str =
    "Das hab ich nicht ganz verstanden. Welchen Termin möchtest du ändern?";
pub const DELETE_FALLBACK: &str =
    "Das hab ich nicht ganz verstanden. Welchen Termin möchtest du löschen?";

pub const ASK_TIME: &str = "Zu welcher Uhrzeit soll ich das eintragen?";
pub const END_BEFORE_START: &str =
    "Die Endzeit liegt vor der Startzeit. Wann genau soll der Termin enden?";
pub const DEFAULT_TITLE: &str = "Termin";
pub const NOT_FOUND: &str = "Ich finde keinen passenden Termin.";
pub const NOTHING_TO_CHANGE: &str = "Was soll ich an dem Termin ändern?";

pub const DELETE_SCOPE_QUESTION: &str = "Das ist ein wiederkehrender Termin. Nur dieses Mal oder \
alle zukünftigen löschen?\n1) Nur dieses Mal\n2) Alle zukünftigen";
pub const SCOPE_REASK: &str = "Bitte wähl 1 für nur diesen Termin oder 2 für alle zukünftigen.";
pub const DELETED_THIS_ONLY: &str = "Erledigt! Nur dieser Termin wurde gelöscht.";
pub const CREATION_DECLINED: &str = "Alles klar, Termin wurde nicht erstellt.";

pub const EXTRACTION_FAILED: &str =
    "Das hab ich gerade nicht verarbeiten können. Probier's bitte nochmal.";
pub const APOLOGY: &str = "Entschuldigung, da ist was schiefgelaufen. Probier's nochmal.";

pub fn greeting(name: Option<&str>) -> String {
    let salutation = match name {
        Some(name) => format!("Hey {name}!"),
        None => "Hey!".to_string(),
    };
    format!(
        "{salutation} Ich bin dein Familienkalender-Bot. Schreib mir einfach, was du wissen oder \
         eintragen willst!"
    )
}

pub fn calendar_error(error: &CalendarError) -> &'static str {
    match error {
        CalendarError::PermissionDenied => {
            "Zugriff auf den Kalender verweigert. Bitte prüf die Freigabe-Einstellungen."
        }
        CalendarError::RateLimited => "Zu viele Anfragen, probier's gleich nochmal.",
        CalendarError::NotFound => "Den Termin gibt's nicht mehr.",
        CalendarError::Api(_) => "Fehler beim Kalender-Zugriff. Probier's nochmal.",
    }
}

/// `HH:MM - Title`, or just the title for all-day events.
fn event_line(event: &CalendarEvent) -> String {
    match &event.timing {
        EventTiming::Timed { start, .. } => {
            format!("{} - {}", format_time(start.time()), event.title)
        }
        EventTiming::AllDay { .. } => event.title.clone(),
    }
}

fn event_lines(events: &[CalendarEvent]) -> String {
    events.iter().map(event_line).collect::<Vec<_>>().join(" | ")
}

pub fn day_overview(date: NaiveDate, events: &[CalendarEvent]) -> String {
    if events.is_empty() {
        format!("{} ist frei!", date_day_name(date))
    } else {
        event_lines(events)
    }
}

pub fn range_overview(days: &[(NaiveDate, Vec<CalendarEvent>)]) -> String {
    days.iter()
        .map(|(date, events)| {
            if events.is_empty() {
                format!("{}: frei", date_day_name(*date))
            } else {
                format!("{}: {}", date_day_name(*date), event_lines(events))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn created(event: &CalendarEvent) -> String {
    match &event.timing {
        EventTiming::Timed { start, end } => format!(
            "Klar, hab ich eingetragen! {}, {} {}-{}",
            event.title,
            date_day_name(start.date_naive()),
            format_time(start.time()),
            format_time(end.time())
        ),
        EventTiming::AllDay { start, end_exclusive } => {
            let last_day = end_exclusive.pred_opt().unwrap_or(*start);
            format!(
                "Klar, hab ich eingetragen! {}, {} bis {} (ganztägig)",
                event.title,
                format_short_date(*start),
                format_short_date(last_day)
            )
        }
    }
}

fn pattern(recurrence: &Recurrence) -> String {
    match (recurrence.frequency, recurrence.day_of_week) {
        (Frequency::Daily, _) => "täglich".to_string(),
        (Frequency::Weekly, Some(weekday)) => format!("jeden {}", day_name(weekday)),
        (Frequency::Weekly, None) => "wöchentlich".to_string(),
        (Frequency::Monthly, _) => "monatlich".to_string(),
    }
}

pub fn created_recurring(
    title: &str,
    recurrence: &Recurrence,
    next_occurrences: &[DateTime<Tz>],
) -> String {
    let at = next_occurrences.first().map(|first| format_time(first.time())).unwrap_or_default();
    let next = next_occurrences
        .iter()
        .map(|occurrence| format_day_month(occurrence.date_naive()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut reply = format!("{title} {} um {at} erstellt. Nächste: {next}", pattern(recurrence));
    if let Some(end_date) = recurrence.end_date {
        reply.push_str(&format!(" Endet: {}", format_full_date(end_date)));
    }
    reply
}

pub fn conflict_question(conflicts: &[CalendarEvent]) -> String {
    let names = conflicts
        .iter()
        .map(|event| match &event.timing {
            EventTiming::Timed { start, .. } => {
                format!("{} um {} Uhr", event.title, format_time(start.time()))
            }
            EventTiming::AllDay { .. } => event.title.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("Achtung: Überschneidung mit {names}. Trotzdem erstellen?")
}

pub fn candidates(events: &[CalendarEvent]) -> String {
    let options = events
        .iter()
        .enumerate()
        .map(|(index, event)| {
            let at = match &event.timing {
                EventTiming::Timed { start, .. } => format_time(start.time()),
                EventTiming::AllDay { .. } => "ganztägig".to_string(),
            };
            format!("{}) {} {at}", index + 1, event.title)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Welchen meinst du?\n{options}")
}

pub fn updated(event: &CalendarEvent) -> String {
    match &event.timing {
        EventTiming::Timed { start, .. } => format!(
            "Geändert: {} jetzt {} {}",
            event.title,
            date_day_name(start.date_naive()),
            format_time(start.time())
        ),
        EventTiming::AllDay { start, .. } => {
            format!("Geändert: {} jetzt {} ganztägig", event.title, date_day_name(*start))
        }
    }
}

pub fn deleted(title: &str, date: NaiveDate) -> String {
    format!("Erledigt! {title} am {} wurde gelöscht.", date_day_name(date))
}

pub fn series_trimmed(cutover: NaiveDate) -> String {
    format!("Alle zukünftigen Termine ab {}. gelöscht.", format_day_month(cutover))
}
