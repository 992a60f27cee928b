pub mod aggregator;
pub mod client;
pub mod format;
pub mod models;
pub mod token;

pub use aggregator::Aggregator;
pub use client::{GoogleCalendarClient, SourceClient};
pub use models::{AggregationResult, CalendarEvent};
pub use token::{Credential, CredentialStore, GoogleCredentialStore};
