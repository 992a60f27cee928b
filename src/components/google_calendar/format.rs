use super::models::CalendarEvent;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Text shown for a day without events
pub const NO_EVENTS: &str = "No events scheduled.";

/// Digest label for the current day
pub const LABEL_TODAY: &str = "Today";

/// Digest label for the next day
pub const LABEL_TOMORROW: &str = "Tomorrow";

/// Placeholder for a missing start or end time
const UNKNOWN_TIME: &str = "??:??";

/// Short date, e.g. "Mon 3 Jun"
pub fn format_date(date: NaiveDate) -> String {
    date.format("%a %-d %b").to_string()
}

/// 24h wall-clock time of an instant in `tz`
fn format_time(instant: Option<DateTime<Utc>>, tz: Tz) -> String {
    instant
        .map(|t| t.with_timezone(&tz).format("%H:%M").to_string())
        .unwrap_or_else(|| UNKNOWN_TIME.to_string())
}

/// "1 event" or "N events"
pub fn event_count(count: usize) -> String {
    format!("{} event{}", count, if count == 1 { "" } else { "s" })
}

/// Append the all-day block, then the timed block, one line per event
fn push_event_blocks(message: &mut String, events: &[CalendarEvent], tz: Tz) {
    let (all_day, timed): (Vec<&CalendarEvent>, Vec<&CalendarEvent>) =
        events.iter().partition(|e| e.is_all_day);

    for event in &all_day {
        message.push_str(&format!("All day: {} [{}]\n", event.title, event.source_name));
    }

    if !all_day.is_empty() && !timed.is_empty() {
        message.push('\n');
    }

    for event in &timed {
        message.push_str(&format!(
            "{} - {}  {} [{}]\n",
            format_time(event.start_time, tz),
            format_time(event.end_time, tz),
            event.title,
            event.source_name
        ));
    }
}

/// Render the digest of one day.
///
/// Events are expected in display order. Times are shown in `tz`.
pub fn render_day(events: &[CalendarEvent], date: NaiveDate, label: &str, tz: Tz) -> String {
    let mut message = format!("📅 {} ({})\n\n", label, format_date(date));

    if events.is_empty() {
        message.push_str(NO_EVENTS);
        return message;
    }

    push_event_blocks(&mut message, events, tz);
    message.push('\n');
    message.push_str(&event_count(events.len()));

    message
}

/// Render a multi-day digest.
///
/// Days are printed in the given order, followed by the total event count.
pub fn render_week(events_by_date: &[(NaiveDate, Vec<CalendarEvent>)], tz: Tz) -> String {
    let (first, last) = match (events_by_date.first(), events_by_date.last()) {
        (Some((first, _)), Some((last, _))) => (*first, *last),
        _ => return format!("📅 This week\n\n{}", NO_EVENTS),
    };

    let mut message = format!(
        "📅 This week ({} - {})\n",
        format_date(first),
        format_date(last)
    );

    let mut total = 0;
    for (date, events) in events_by_date {
        message.push_str(&format!("\n{}\n", format_date(*date)));
        if events.is_empty() {
            message.push_str(NO_EVENTS);
            message.push('\n');
        } else {
            push_event_blocks(&mut message, events, tz);
        }
        total += events.len();
    }

    message.push('\n');
    message.push_str(&event_count(total));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn all_day(title: &str, source: &str) -> CalendarEvent {
        CalendarEvent {
            id: title.to_lowercase(),
            title: title.to_string(),
            start_time: Some(Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap()),
            end_time: Some(Utc.with_ymd_and_hms(2024, 6, 4, 0, 0, 0).unwrap()),
            is_all_day: true,
            source_name: source.to_string(),
        }
    }

    fn timed(title: &str, source: &str, hour: u32) -> CalendarEvent {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, hour, 0, 0).unwrap();
        CalendarEvent {
            id: title.to_lowercase(),
            title: title.to_string(),
            start_time: Some(start),
            end_time: Some(start + Duration::hours(1)),
            is_all_day: false,
            source_name: source.to_string(),
        }
    }

    #[test]
    fn test_render_empty_day() {
        let message = render_day(&[], date(), "Today", chrono_tz::UTC);
        assert_eq!(message, "📅 Today (Mon 3 Jun)\n\nNo events scheduled.");
        assert!(!message.contains("event\n"));
    }

    #[test]
    fn test_render_mixed_day() {
        let events = vec![
            all_day("Conference", "Work"),
            timed("Standup", "Personal", 9),
        ];
        let message = render_day(&events, date(), "Tomorrow", chrono_tz::UTC);

        assert_eq!(
            message,
            "📅 Tomorrow (Mon 3 Jun)\n\n\
             All day: Conference [Work]\n\
             \n\
             09:00 - 10:00  Standup [Personal]\n\
             \n\
             2 events"
        );
    }

    #[test]
    fn test_render_single_event() {
        let events = vec![timed("Dentist", "Home", 14)];
        let message = render_day(&events, date(), "Today", chrono_tz::UTC);
        assert!(message.ends_with("\n1 event"));
        // No separator without an all-day block
        assert!(message.contains("(Mon 3 Jun)\n\n14:00 - 15:00  Dentist [Home]\n\n1 event"));
    }

    #[test]
    fn test_render_times_in_user_timezone() {
        let events = vec![timed("Standup", "Work", 6)];
        let message = render_day(&events, date(), "Today", chrono_tz::Europe::Helsinki);
        assert!(message.contains("09:00 - 10:00  Standup [Work]"));
    }

    #[test]
    fn test_render_missing_times() {
        let mut event = timed("Mystery", "Work", 9);
        event.start_time = None;
        event.end_time = None;
        let message = render_day(&[event], date(), "Today", chrono_tz::UTC);
        assert!(message.contains("??:?? - ??:??  Mystery [Work]"));
    }

    #[test]
    fn test_render_week() {
        let days: Vec<(NaiveDate, Vec<CalendarEvent>)> = (0..7)
            .map(|offset| {
                let day = date() + Duration::days(offset);
                let events = match offset {
                    0 => vec![timed("Standup", "Work", 9)],
                    2 => vec![all_day("Holiday", "Family"), timed("Gym", "Home", 17)],
                    _ => Vec::new(),
                };
                (day, events)
            })
            .collect();

        let message = render_week(&days, chrono_tz::UTC);

        assert!(message.starts_with("📅 This week (Mon 3 Jun - Sun 9 Jun)\n"));
        assert!(message.contains("\nMon 3 Jun\n09:00 - 10:00  Standup [Work]\n"));
        assert!(message.contains("\nTue 4 Jun\nNo events scheduled.\n"));
        assert!(message.contains(
            "\nWed 5 Jun\nAll day: Holiday [Family]\n\n17:00 - 18:00  Gym [Home]\n"
        ));
        assert!(message.ends_with("\n3 events"));
    }

    #[test]
    fn test_render_week_without_events() {
        let days: Vec<(NaiveDate, Vec<CalendarEvent>)> = (0..7)
            .map(|offset| (date() + Duration::days(offset), Vec::new()))
            .collect();
        let message = render_week(&days, chrono_tz::UTC);
        assert_eq!(message.matches(NO_EVENTS).count(), 7);
        assert!(message.ends_with("\n0 events"));

        assert_eq!(render_week(&[], chrono_tz::UTC), "📅 This week\n\nNo events scheduled.");
    }
}
