use super::models::{Trigger, TriggerAction};
use crate::components::google_calendar::CredentialStore;
use crate::config::UserSchedule;
use crate::error::{other_error, BotResult};
use crate::utils::clock::Clock;
use crate::utils::time::{parse_timezone, parse_trigger_time};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration as TokioDuration};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Longest sleep between checks, so wall-clock jumps are noticed
const MAX_TICK: TokioDuration = TokioDuration::from_secs(30);

/// How long `stop` waits for running firings before abandoning them
const STOP_GRACE: TokioDuration = TokioDuration::from_secs(10);

/// A firing this late (process suspended, clock jump) is skipped
fn missed_fire_grace() -> Duration {
    Duration::minutes(10)
}

/// Callback invoked once per trigger firing
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn fire(&self, trigger: &Trigger) -> BotResult<()>;
}

/// Build the triggers of all users.
///
/// Users without a linked account or with an unknown timezone get no
/// triggers. An invalid time skips only its own trigger.
pub fn build_schedule(schedules: &[UserSchedule], credentials: &dyn CredentialStore) -> Vec<Trigger> {
    let mut triggers = Vec::new();

    for schedule in schedules {
        let user_id = schedule.user_id;

        if !credentials.has_linked_credential(user_id) {
            info!(user_id, "Skipping scheduler for user: no Google account linked");
            continue;
        }

        let timezone = match parse_timezone(&schedule.timezone) {
            Ok(tz) => tz,
            Err(e) => {
                warn!(user_id, error = %e, "Skipping scheduler for user");
                continue;
            }
        };

        match schedule.daily_digest_time.as_deref().map(parse_trigger_time) {
            Some(Ok((fire_hour, fire_minute))) => {
                let trigger = Trigger {
                    owner_user_id: user_id,
                    fire_hour,
                    fire_minute,
                    timezone,
                    action: TriggerAction::DailyDigest,
                };
                info!("Scheduling {}", trigger);
                triggers.push(trigger);
            }
            Some(Err(e)) => warn!(user_id, error = %e, "Skipping daily digest"),
            None => debug!(user_id, "Daily digest disabled"),
        }

        for reminder in &schedule.reminders {
            match parse_trigger_time(&reminder.time) {
                Ok((fire_hour, fire_minute)) => {
                    let trigger = Trigger {
                        owner_user_id: user_id,
                        fire_hour,
                        fire_minute,
                        timezone,
                        action: TriggerAction::Reminder {
                            message: reminder.message.clone(),
                        },
                    };
                    info!("Scheduling {}: \"{}\"", trigger, reminder.message);
                    triggers.push(trigger);
                }
                Err(e) => warn!(user_id, error = %e, "Skipping reminder"),
            }
        }
    }

    triggers
}

/// Clears the in-flight flag when a firing ends, even by panic
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ScheduledTrigger {
    trigger: Arc<Trigger>,
    next_fire: Option<DateTime<Utc>>,
    in_flight: Arc<AtomicBool>,
}

/// Owns the triggers and decides when each one fires.
///
/// Triggers are fixed at construction. Each firing runs as its own task, so
/// a slow or failing action never delays another trigger.
pub struct TriggerScheduler {
    triggers: Vec<ScheduledTrigger>,
    handler: Arc<dyn TriggerHandler>,
    clock: Arc<dyn Clock>,
    tracker: TaskTracker,
}

impl TriggerScheduler {
    pub fn new(triggers: Vec<Trigger>, handler: Arc<dyn TriggerHandler>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let triggers = triggers
            .into_iter()
            .map(|trigger| {
                let next_fire = trigger.next_fire_after(now);
                match next_fire {
                    Some(at) => debug!("Next {} at {}", trigger, at),
                    None => error!("Cannot compute next firing of {}, disabled", trigger),
                }
                ScheduledTrigger {
                    trigger: Arc::new(trigger),
                    next_fire,
                    in_flight: Arc::new(AtomicBool::new(false)),
                }
            })
            .collect();

        Self {
            triggers,
            handler,
            clock,
            tracker: TaskTracker::new(),
        }
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter().map(|s| s.trigger.as_ref())
    }

    /// Earliest upcoming firing of any trigger
    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.triggers.iter().filter_map(|s| s.next_fire).min()
    }

    /// Start every trigger that is due and reschedule it for its next day.
    ///
    /// Returns the number of firings started.
    pub fn run_pending(&mut self) -> usize {
        let now = self.clock.now();
        let mut started = 0;

        for scheduled in &mut self.triggers {
            let due = match scheduled.next_fire {
                Some(due) if due <= now => due,
                _ => continue,
            };
            scheduled.next_fire = scheduled.trigger.next_fire_after(now);
            let trigger = Arc::clone(&scheduled.trigger);

            if now - due > missed_fire_grace() {
                warn!("Missed {} due at {}, skipping to {:?}", trigger, due, scheduled.next_fire);
                continue;
            }

            if scheduled.in_flight.swap(true, Ordering::SeqCst) {
                warn!("Previous firing of {} still running, skipping", trigger);
                continue;
            }

            let guard = InFlightGuard(Arc::clone(&scheduled.in_flight));
            let handler = Arc::clone(&self.handler);
            self.tracker.spawn(async move {
                let _guard = guard;
                let user_id = trigger.owner_user_id;
                info!(user_id, "Running scheduled {}", trigger.kind());
                match handler.fire(&trigger).await {
                    Ok(()) => info!(user_id, "Finished scheduled {}", trigger.kind()),
                    Err(e) => error!(user_id, error = %e, "Scheduled {} failed", trigger.kind()),
                }
            });
            started += 1;
        }

        started
    }

    /// Wait until every started firing has finished
    pub async fn wait_for_firings(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn time_until_next(&self) -> TokioDuration {
        let now = self.clock.now();
        self.next_fire()
            .map(|next| (next - now).to_std().unwrap_or(TokioDuration::ZERO))
            .unwrap_or(MAX_TICK)
            .min(MAX_TICK)
    }

    /// Spawn the tick loop
    pub fn start(mut self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let tracker = self.tracker.clone();
        let token = cancel.clone();

        info!("Starting trigger scheduler with {} triggers", self.triggers.len());
        let task = tokio::spawn(async move {
            loop {
                self.run_pending();
                let wait = self.time_until_next();
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(wait) => {}
                }
            }
            info!("Trigger scheduler loop stopped");
        });

        SchedulerHandle {
            cancel,
            tracker,
            task,
        }
    }
}

/// Handle to a running [`TriggerScheduler`]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tracker: TaskTracker,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop starting new firings and give running ones a grace period
    pub async fn stop(self) -> BotResult<()> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| other_error(&format!("Scheduler task error: {}", e)))?;

        self.tracker.close();
        if timeout(STOP_GRACE, self.tracker.wait()).await.is_err() {
            warn!(
                "Abandoning {} scheduled firings still running",
                self.tracker.len()
            );
        }

        info!("Trigger scheduler stopped");
        Ok(())
    }
}
