use miette::{Diagnostic, Result};
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Invalid timezone: {0}")]
    #[diagnostic(code(kalenteribotti::invalid_timezone))]
    InvalidTimezone(String),

    #[error("User {0} not found")]
    #[diagnostic(code(kalenteribotti::user_not_found))]
    UserNotFound(u64),

    #[error("User {0} has not linked a Google account")]
    #[diagnostic(code(kalenteribotti::not_linked))]
    NotLinked(u64),

    #[error("Failed to fetch calendar {source_id}: {cause}")]
    #[diagnostic(code(kalenteribotti::source_fetch_failed))]
    SourceFetchFailed { source_id: String, cause: String },

    #[error("Invalid trigger time \"{raw}\" (expected HH:MM)")]
    #[diagnostic(code(kalenteribotti::invalid_trigger_time))]
    InvalidTriggerTime { raw: String },

    #[error("User {0} is not authorized to use this bot")]
    #[diagnostic(code(kalenteribotti::unauthorized))]
    Unauthorized(u64),

    #[error("Credential error: {0}")]
    #[diagnostic(code(kalenteribotti::credential))]
    Credential(String),

    #[error("Discord API error: {0}")]
    #[diagnostic(code(kalenteribotti::discord_api))]
    DiscordApi(#[from] serenity::Error),

    #[error("HTTP error: {0}")]
    #[diagnostic(code(kalenteribotti::http))]
    Http(#[from] reqwest::Error),

    #[error("Environment error: {0}")]
    #[diagnostic(code(kalenteribotti::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(kalenteribotti::config))]
    Config(String),

    #[error("Google Calendar API error: {0}")]
    #[diagnostic(code(kalenteribotti::google_calendar))]
    GoogleCalendar(String),

    #[error(transparent)]
    #[diagnostic(code(kalenteribotti::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(kalenteribotti::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(kalenteribotti::other))]
    Other(String),
}

// Implement From for TOML deserialization errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type BotResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create Google Calendar errors
pub fn google_calendar_error(message: &str) -> Error {
    Error::GoogleCalendar(message.to_string())
}

/// Helper to create per-source fetch errors
pub fn source_fetch_error(source_id: &str, cause: impl ToString) -> Error {
    Error::SourceFetchFailed {
        source_id: source_id.to_string(),
        cause: cause.to_string(),
    }
}

/// Helper to create other errors
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}
