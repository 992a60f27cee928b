use super::models::{Trigger, TriggerAction};
use super::scheduler::TriggerHandler;
use crate::components::dispatch::NotificationDispatcher;
use crate::components::google_calendar::format::{render_day, LABEL_TOMORROW};
use crate::components::google_calendar::Aggregator;
use crate::error::BotResult;
use crate::utils::clock::Clock;
use crate::utils::time::local_date_offset;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns trigger firings into direct messages
pub struct NotificationHandler {
    aggregator: Arc<Aggregator>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl NotificationHandler {
    pub fn new(
        aggregator: Arc<Aggregator>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            aggregator,
            dispatcher,
            clock,
        }
    }

    /// Digest of the day after the firing, in the trigger's timezone
    async fn send_digest(&self, trigger: &Trigger) -> BotResult<()> {
        let user_id = trigger.owner_user_id;
        let tz = trigger.timezone;
        let tomorrow = local_date_offset(self.clock.now(), tz, 1);

        let result = self.aggregator.aggregate(user_id, tomorrow).await?;
        if result.is_partial() {
            warn!(
                user_id,
                failed = ?result.failed_sources,
                "Sending digest without some calendars"
            );
        }

        let message = render_day(&result.events, tomorrow, LABEL_TOMORROW, tz);
        self.dispatcher.send(user_id, &message).await?;
        debug!(user_id, count = result.events.len(), "Daily digest sent");
        Ok(())
    }
}

#[async_trait]
impl TriggerHandler for NotificationHandler {
    async fn fire(&self, trigger: &Trigger) -> BotResult<()> {
        match &trigger.action {
            TriggerAction::DailyDigest => self.send_digest(trigger).await,
            TriggerAction::Reminder { message } => {
                self.dispatcher.send(trigger.owner_user_id, message).await
            }
        }
    }
}
