use crate::error::{config_error, env_error, BotResult};
use dotenvy::dotenv;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::fmt;
use std::fs;

/// Default activity text for the bot
pub const DEFAULT_ACTIVITY: &str = "Selaa kalenteria";

/// Default location of the per-user schedule file
pub const DEFAULT_USERS_CONFIG: &str = "config/users.toml";

/// Default OAuth redirect URI used by the token helper
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";

/// A fixed-text reminder sent at a local wall-clock time
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReminderConfig {
    /// Local time in HH:MM
    pub time: String,
    /// Message sent verbatim
    pub message: String,
}

/// Per-user scheduling configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSchedule {
    pub user_id: u64,
    pub name: String,
    /// IANA timezone name
    pub timezone: String,
    /// Daily digest time in HH:MM, `None` disables the digest
    pub daily_digest_time: Option<String>,
    pub reminders: Vec<ReminderConfig>,
    /// Google calendar ids, in display order
    pub calendar_sources: Vec<String>,
}

/// One `[users.<id>]` table of the users file
#[derive(Debug, Clone, Deserialize)]
struct UserEntry {
    #[serde(default)]
    name: String,
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default)]
    notify_time: Option<String>,
    #[serde(default)]
    calendars: Vec<String>,
    #[serde(default)]
    reminders: Vec<ReminderConfig>,
}

fn default_timezone() -> String {
    String::from("UTC")
}

/// Layout of the users file
#[derive(Debug, Clone, Deserialize)]
struct UsersFile {
    #[serde(default)]
    allowed_user_ids: Vec<u64>,
    #[serde(default)]
    users: HashMap<String, UserEntry>,
}

/// Main configuration structure for the bot.
///
/// Loaded once at startup and shared read-only behind an `Arc`.
#[derive(Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,
    /// Google Calendar API client ID
    pub google_client_id: String,
    /// Google Calendar API client secret
    pub google_client_secret: String,
    /// OAuth redirect URI registered for the client
    pub google_redirect_uri: String,
    /// Bot activity status text
    pub activity: String,
    /// Users that may talk to the bot and receive scheduled messages
    pub allowed_user_ids: HashSet<u64>,
    /// Schedules keyed by Discord user ID
    pub users: BTreeMap<u64, UserSchedule>,
    /// Google refresh tokens keyed by Discord user ID
    refresh_tokens: HashMap<u64, String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("google_client_id", &self.google_client_id)
            .field("google_redirect_uri", &self.google_redirect_uri)
            .field("activity", &self.activity)
            .field("allowed_user_ids", &self.allowed_user_ids)
            .field("users", &self.users)
            .field("linked_users", &self.refresh_tokens.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Config {
    /// Load configuration from environment and the users file
    pub fn load() -> BotResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let users_path =
            env::var("USERS_CONFIG").unwrap_or_else(|_| String::from(DEFAULT_USERS_CONFIG));
        let content = fs::read_to_string(&users_path).map_err(|e| {
            config_error(&format!(
                "Failed to read {}: {}. Copy config/users.example.toml and fill in your values.",
                users_path, e
            ))
        })?;

        let mut config = Self::from_toml_str(&content, |user_id| {
            env::var(format!("GOOGLE_REFRESH_TOKEN_{}", user_id)).ok()
        })?;

        config.discord_token = env::var("DISCORD_TOKEN").map_err(|_| env_error("DISCORD_TOKEN"))?;
        config.google_client_id =
            env::var("GOOGLE_CLIENT_ID").map_err(|_| env_error("GOOGLE_CLIENT_ID"))?;
        config.google_client_secret =
            env::var("GOOGLE_CLIENT_SECRET").map_err(|_| env_error("GOOGLE_CLIENT_SECRET"))?;
        if let Ok(uri) = env::var("GOOGLE_REDIRECT_URI") {
            config.google_redirect_uri = uri;
        }
        if let Ok(activity) = env::var("BOT_ACTIVITY") {
            config.activity = activity;
        }

        Ok(config)
    }

    /// Build a configuration from the users file content.
    ///
    /// `refresh_token` is asked once per user; empty tokens count as unlinked.
    /// Credentials and bot identity are left empty.
    pub fn from_toml_str<F>(content: &str, refresh_token: F) -> BotResult<Self>
    where
        F: Fn(u64) -> Option<String>,
    {
        let file: UsersFile = toml::from_str(content)?;

        let mut users = BTreeMap::new();
        let mut refresh_tokens = HashMap::new();
        for (key, entry) in file.users {
            let user_id = key
                .trim()
                .parse::<u64>()
                .map_err(|_| config_error(&format!("Invalid user id '{}'", key)))?;

            if let Some(token) = refresh_token(user_id).filter(|t| !t.trim().is_empty()) {
                refresh_tokens.insert(user_id, token);
            }

            users.insert(
                user_id,
                UserSchedule {
                    user_id,
                    name: entry.name,
                    timezone: entry.timezone,
                    daily_digest_time: entry.notify_time.filter(|t| !t.trim().is_empty()),
                    reminders: entry.reminders,
                    calendar_sources: entry.calendars,
                },
            );
        }

        Ok(Config {
            discord_token: String::new(),
            google_client_id: String::new(),
            google_client_secret: String::new(),
            google_redirect_uri: String::from(DEFAULT_REDIRECT_URI),
            activity: String::from(DEFAULT_ACTIVITY),
            allowed_user_ids: file.allowed_user_ids.into_iter().collect(),
            users,
            refresh_tokens,
        })
    }

    /// Check if a user may use the bot
    pub fn is_user_allowed(&self, user_id: u64) -> bool {
        self.allowed_user_ids.contains(&user_id)
    }

    /// Get the schedule of a single user
    pub fn user_schedule(&self, user_id: u64) -> Option<&UserSchedule> {
        self.users.get(&user_id)
    }

    /// Schedules of all allowed users, ordered by user id
    pub fn schedules(&self) -> Vec<UserSchedule> {
        self.users
            .values()
            .filter(|s| self.is_user_allowed(s.user_id))
            .cloned()
            .collect()
    }

    /// Google refresh token of a user, if linked
    pub fn refresh_token(&self, user_id: u64) -> Option<&str> {
        self.refresh_tokens.get(&user_id).map(String::as_str)
    }
}
