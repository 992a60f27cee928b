#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use kalenteribotti::components::dispatch::NotificationDispatcher;
use kalenteribotti::components::google_calendar::models::{GoogleEvent, GoogleEventTime};
use kalenteribotti::components::google_calendar::{Credential, CredentialStore, SourceClient};
use kalenteribotti::config::Config;
use kalenteribotti::error::{source_fetch_error, BotResult, Error};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

/// Credential store with a fixed set of linked users
pub struct MockCredentials {
    linked: HashSet<u64>,
    pub requests: AtomicUsize,
}

impl MockCredentials {
    pub fn linked(ids: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            linked: ids.iter().copied().collect(),
            requests: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CredentialStore for MockCredentials {
    fn has_linked_credential(&self, user_id: u64) -> bool {
        self.linked.contains(&user_id)
    }

    async fn get_credential(&self, user_id: u64) -> BotResult<Credential> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.linked.contains(&user_id) {
            Ok(Credential::new(format!("token-{}", user_id)))
        } else {
            Err(Error::NotLinked(user_id))
        }
    }
}

/// Calendar source serving canned events per calendar id
#[derive(Default)]
pub struct MockSource {
    events: HashMap<String, Vec<GoogleEvent>>,
    names: HashMap<String, String>,
    failing: HashSet<String>,
    /// When set, every fetch waits here so concurrent fan-out can be observed
    barrier: Option<Arc<Barrier>>,
    pub fetches: AtomicUsize,
    pub windows: Mutex<Vec<(String, DateTime<Tz>, DateTime<Tz>)>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calendar(mut self, id: &str, name: &str, events: Vec<GoogleEvent>) -> Self {
        self.names.insert(id.to_string(), name.to_string());
        self.events.insert(id.to_string(), events);
        self
    }

    pub fn with_failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for MockSource {
    async fn fetch_events(
        &self,
        source_id: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        _credential: &Credential,
    ) -> BotResult<Vec<GoogleEvent>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.windows
            .lock()
            .unwrap()
            .push((source_id.to_string(), start, end));

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }

        if self.failing.contains(source_id) {
            return Err(source_fetch_error(source_id, "HTTP 503 Service Unavailable"));
        }
        Ok(self.events.get(source_id).cloned().unwrap_or_default())
    }

    async fn resolve_source_name(&self, source_id: &str, _credential: &Credential) -> BotResult<String> {
        Ok(self
            .names
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| source_id.to_string()))
    }
}

/// Dispatcher that records every message instead of sending it
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<(u64, String)>>,
    /// Delay before recording, to simulate a slow transport
    pub delay: Option<Duration>,
}

impl RecordingDispatcher {
    pub fn messages(&self) -> Vec<(u64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(&self, user_id: u64, text: &str) -> BotResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push((user_id, text.to_string()));
        Ok(())
    }
}

pub fn timed_event(id: &str, title: &str, start: &str, end: &str) -> GoogleEvent {
    GoogleEvent {
        id: Some(id.to_string()),
        summary: Some(title.to_string()),
        start: Some(GoogleEventTime {
            date_time: Some(start.to_string()),
            date: None,
        }),
        end: Some(GoogleEventTime {
            date_time: Some(end.to_string()),
            date: None,
        }),
    }
}

pub fn all_day_event(id: &str, title: &str, date: &str, end_date: &str) -> GoogleEvent {
    GoogleEvent {
        id: Some(id.to_string()),
        summary: Some(title.to_string()),
        start: Some(GoogleEventTime {
            date_time: None,
            date: Some(date.to_string()),
        }),
        end: Some(GoogleEventTime {
            date_time: None,
            date: Some(end_date.to_string()),
        }),
    }
}

pub fn config(toml: &str) -> Arc<Config> {
    Arc::new(Config::from_toml_str(toml, |_| None).unwrap())
}

pub fn utc(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}
