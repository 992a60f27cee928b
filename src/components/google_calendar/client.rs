use super::models::{GoogleCalendarInfo, GoogleCalendarList, GoogleEvent, GoogleEventList};
use super::token::Credential;
use crate::error::{google_calendar_error, source_fetch_error, BotResult};
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Google Calendar REST API root
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Name shown for calendars without a summary in the calendar list
pub const UNNAMED_CALENDAR: &str = "Unnamed Calendar";

/// One remote calendar API.
///
/// Calls are independent of each other; failures come back as
/// `SourceFetchFailed` and the caller decides what to do with them.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch the events of one calendar overlapping `[start, end]`
    async fn fetch_events(
        &self,
        source_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        credential: &Credential,
    ) -> BotResult<Vec<GoogleEvent>>;

    /// Display name of one calendar
    async fn resolve_source_name(&self, source_id: &str, credential: &Credential)
        -> BotResult<String>;
}

/// [`SourceClient`] talking to the Google Calendar API
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    client: Client,
    base_url: Url,
}

impl Default for GoogleCalendarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleCalendarClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: Url::parse(CALENDAR_API_BASE).expect("CALENDAR_API_BASE is a valid URL"),
        }
    }

    /// Use another API root, e.g. a local test server
    pub fn with_base_url(base_url: &str) -> BotResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| google_calendar_error(&format!("Failed to parse URL: {}", e)))?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    /// Build `<base>/<segments...>` with each segment percent-encoded
    fn api_url(&self, segments: &[&str]) -> BotResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| google_calendar_error("API base URL cannot have a path"))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// GET a JSON document, mapping every failure to `SourceFetchFailed`
    async fn get_json<T: DeserializeOwned>(
        &self,
        source_id: &str,
        url: Url,
        credential: &Credential,
    ) -> BotResult<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(credential.access_token())
            .send()
            .await
            .map_err(|e| source_fetch_error(source_id, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(source_fetch_error(
                source_id,
                format!("HTTP {} - {}", status, error_body),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| source_fetch_error(source_id, format!("Failed to parse response: {}", e)))
    }

    /// List the calendars visible to the credential as `(id, name)` pairs
    pub async fn list_calendars(&self, credential: &Credential) -> BotResult<Vec<(String, String)>> {
        let url = self.api_url(&["users", "me", "calendarList"])?;
        let list: GoogleCalendarList = self.get_json("calendarList", url, credential).await?;

        Ok(list
            .items
            .into_iter()
            .map(|cal| {
                let name = cal
                    .summary
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| UNNAMED_CALENDAR.to_string());
                (cal.id, name)
            })
            .collect())
    }
}

#[async_trait]
impl SourceClient for GoogleCalendarClient {
    async fn fetch_events(
        &self,
        source_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        credential: &Credential,
    ) -> BotResult<Vec<GoogleEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.api_url(&["calendars", source_id, "events"])?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("timeMin", &start.to_rfc3339())
                    .append_pair("timeMax", &end.to_rfc3339())
                    .append_pair("singleEvents", "true")
                    .append_pair("orderBy", "startTime");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: GoogleEventList = self.get_json(source_id, url, credential).await?;
            events.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(source_id, count = events.len(), "Fetched calendar events");
        Ok(events)
    }

    async fn resolve_source_name(
        &self,
        source_id: &str,
        credential: &Credential,
    ) -> BotResult<String> {
        let url = self.api_url(&["calendars", source_id])?;
        let info: GoogleCalendarInfo = self.get_json(source_id, url, credential).await?;

        Ok(info
            .summary
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| source_id.to_string()))
    }
}
