pub mod models;
pub mod notifications;
pub mod scheduler;

pub use models::{Trigger, TriggerAction};
pub use notifications::NotificationHandler;
pub use scheduler::{build_schedule, SchedulerHandle, TriggerHandler, TriggerScheduler};
