use crate::utils::time::start_of_day;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeSet;

/// Title used when the calendar omits one
pub const UNTITLED_EVENT: &str = "Untitled";

/// One occurrence on one calendar, normalized for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    /// Source-assigned id, unique within its calendar only
    pub id: String,
    pub title: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_all_day: bool,
    /// Display name of the calendar the event came from
    pub source_name: String,
}

/// Merged events of a user's calendars for one day
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationResult {
    pub events: Vec<CalendarEvent>,
    /// Sources whose fetch failed and whose events are missing
    pub failed_sources: BTreeSet<String>,
}

impl AggregationResult {
    /// True when at least one source could not be fetched
    pub fn is_partial(&self) -> bool {
        !self.failed_sources.is_empty()
    }
}

/// `start`/`end` object of a Google Calendar event
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
}

impl GoogleEventTime {
    /// Resolve to an instant; dates become local midnight in `tz`
    fn to_instant(&self, tz: Tz) -> Option<DateTime<Utc>> {
        if let Some(date_time) = &self.date_time {
            return DateTime::parse_from_rfc3339(date_time)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }
        self.date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(|d| start_of_day(d, tz).with_timezone(&Utc))
    }
}

/// Event item of the Google Calendar `events.list` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoogleEvent {
    pub id: Option<String>,
    pub summary: Option<String>,
    pub start: Option<GoogleEventTime>,
    pub end: Option<GoogleEventTime>,
}

impl GoogleEvent {
    /// Normalize into a [`CalendarEvent`] tagged with its calendar's name
    pub fn into_calendar_event(self, source_name: &str, tz: Tz) -> CalendarEvent {
        let is_all_day = self
            .start
            .as_ref()
            .is_some_and(|s| s.date.is_some());

        CalendarEvent {
            id: self.id.unwrap_or_default(),
            title: self
                .summary
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNTITLED_EVENT.to_string()),
            start_time: self.start.as_ref().and_then(|s| s.to_instant(tz)),
            end_time: self.end.as_ref().and_then(|e| e.to_instant(tz)),
            is_all_day,
            source_name: source_name.to_string(),
        }
    }
}

/// `events.list` response page
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleEventList {
    #[serde(default)]
    pub items: Vec<GoogleEvent>,
    pub next_page_token: Option<String>,
}

/// `calendars.get` and `calendarList.list` item
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoogleCalendarInfo {
    #[serde(default)]
    pub id: String,
    pub summary: Option<String>,
}

/// `calendarList.list` response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoogleCalendarList {
    #[serde(default)]
    pub items: Vec<GoogleCalendarInfo>,
}
