// Export components
pub mod dispatch;
pub mod google_calendar;
pub mod reminders;

pub use dispatch::{DiscordDispatcher, NotificationDispatcher};
pub use google_calendar::Aggregator;
pub use reminders::{SchedulerHandle, TriggerScheduler};
