use crate::utils::time::next_fire_after;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;

/// What a trigger does when it fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAction {
    /// Aggregate tomorrow's events and send the digest
    DailyDigest,
    /// Send a fixed text verbatim
    Reminder { message: String },
}

/// A perpetual once-per-day action at a local wall-clock time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub owner_user_id: u64,
    pub fire_hour: u32,
    pub fire_minute: u32,
    pub timezone: Tz,
    pub action: TriggerAction,
}

impl Trigger {
    /// Next firing strictly after `after`
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_fire_after(self.fire_hour, self.fire_minute, self.timezone, after)
    }

    /// Short name of the action, for logs
    pub fn kind(&self) -> &'static str {
        match self.action {
            TriggerAction::DailyDigest => "daily digest",
            TriggerAction::Reminder { .. } => "reminder",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for user {} at {:02}:{:02} ({})",
            self.kind(),
            self.owner_user_id,
            self.fire_hour,
            self.fire_minute,
            self.timezone.name()
        )
    }
}
