use super::client::SourceClient;
use super::models::{AggregationResult, CalendarEvent};
use super::token::{Credential, CredentialStore};
use crate::config::{Config, UserSchedule};
use crate::error::{BotResult, Error};
use crate::utils::time::{day_window, parse_timezone};
use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of days covered by a week digest
pub const WEEK_DAYS: i64 = 7;

/// Merges the events of all calendars configured for a user.
///
/// Every source is fetched concurrently and the call waits for all of them
/// to settle. A failing source is recorded in
/// [`AggregationResult::failed_sources`] and never fails the whole call.
#[derive(Clone)]
pub struct Aggregator {
    config: Arc<Config>,
    credentials: Arc<dyn CredentialStore>,
    source: Arc<dyn SourceClient>,
}

impl Aggregator {
    pub fn new(
        config: Arc<Config>,
        credentials: Arc<dyn CredentialStore>,
        source: Arc<dyn SourceClient>,
    ) -> Self {
        Self {
            config,
            credentials,
            source,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Timezone of a user who passes the same checks as [`Self::aggregate`]
    pub fn user_timezone(&self, user_id: u64) -> BotResult<Tz> {
        self.preflight(user_id).map(|(_, tz)| tz)
    }

    /// Checks that need no network: known user, linked account, valid zone
    fn preflight(&self, user_id: u64) -> BotResult<(&UserSchedule, Tz)> {
        let schedule = self
            .config
            .user_schedule(user_id)
            .ok_or(Error::UserNotFound(user_id))?;

        if !self.credentials.has_linked_credential(user_id) {
            return Err(Error::NotLinked(user_id));
        }

        let tz = parse_timezone(&schedule.timezone)?;
        Ok((schedule, tz))
    }

    /// Merged events of one civil day in the user's timezone
    pub async fn aggregate(&self, user_id: u64, date: NaiveDate) -> BotResult<AggregationResult> {
        let (schedule, tz) = self.preflight(user_id)?;
        let credential = self.credentials.get_credential(user_id).await?;

        Ok(self
            .aggregate_day(user_id, &schedule.calendar_sources, date, tz, &credential)
            .await)
    }

    /// Merged events of seven consecutive days starting at `start_date`
    pub async fn aggregate_week(
        &self,
        user_id: u64,
        start_date: NaiveDate,
    ) -> BotResult<Vec<(NaiveDate, AggregationResult)>> {
        let (schedule, tz) = self.preflight(user_id)?;
        let credential = self.credentials.get_credential(user_id).await?;

        let days = (0..WEEK_DAYS).map(|offset| {
            let date = start_date + Duration::days(offset);
            let credential = &credential;
            async move {
                let result = self
                    .aggregate_day(user_id, &schedule.calendar_sources, date, tz, credential)
                    .await;
                (date, result)
            }
        });

        Ok(join_all(days).await)
    }

    async fn aggregate_day(
        &self,
        user_id: u64,
        sources: &[String],
        date: NaiveDate,
        tz: Tz,
        credential: &Credential,
    ) -> AggregationResult {
        let (start, end) = day_window(date, tz);

        let fetches = sources.iter().map(|source_id| async move {
            let outcome = self.fetch_source(source_id, start, end, credential).await;
            (source_id, outcome)
        });
        let outcomes = join_all(fetches).await;

        let mut result = AggregationResult::default();
        for (source_id, outcome) in outcomes {
            match outcome {
                Ok(events) => {
                    debug!(user_id, source_id = %source_id, count = events.len(), "Calendar fetched");
                    result.events.extend(events);
                }
                Err(e) => {
                    warn!(user_id, source_id = %source_id, error = %e, "Calendar fetch failed, skipping");
                    result.failed_sources.insert(source_id.clone());
                }
            }
        }

        sort_events(&mut result.events);
        result
    }

    /// Fetch one source's events and name together
    async fn fetch_source(
        &self,
        source_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        credential: &Credential,
    ) -> BotResult<Vec<CalendarEvent>> {
        let (events, name) = futures::join!(
            self.source.fetch_events(source_id, start, end, credential),
            self.source.resolve_source_name(source_id, credential)
        );
        let (events, name) = (events?, name?);
        let tz = start.timezone();

        Ok(events
            .into_iter()
            .map(|event| event.into_calendar_event(&name, tz))
            .collect())
    }
}

/// Order events for display: all-day first, then by start time.
///
/// Events without a start sort last within their group. The sort is stable,
/// so equal keys keep their source order.
pub fn sort_events(events: &mut [CalendarEvent]) {
    events.sort_by_key(|e| (!e.is_all_day, e.start_time.is_none(), e.start_time));
}
