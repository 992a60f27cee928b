use crate::components::google_calendar::{Aggregator, CredentialStore, GoogleCalendarClient};
use crate::config::Config;
use crate::error::BotResult;
use crate::utils::clock::Clock;
use poise::serenity_prelude as serenity;
use std::fmt;
use std::sync::Arc;

// Export submodules
pub mod calendar;
pub mod util;

/// Shared context for all commands
pub struct CommandContext {
    pub aggregator: Arc<Aggregator>,
    pub calendar_client: Arc<GoogleCalendarClient>,
    pub credentials: Arc<dyn CredentialStore>,
    pub clock: Arc<dyn Clock>,
}

impl CommandContext {
    /// Create a new command context
    pub fn new(
        aggregator: Arc<Aggregator>,
        calendar_client: Arc<GoogleCalendarClient>,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            aggregator,
            calendar_client,
            credentials,
            clock,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        self.aggregator.config()
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("config", self.config())
            .field("calendar_client", &self.calendar_client)
            .finish_non_exhaustive()
    }
}

/// Type alias for command result
pub type CommandResult = BotResult<()>;

/// Type alias for poise context
pub type Context<'a> = poise::Context<'a, CommandContext, crate::error::Error>;

/// Red embed for failures
pub fn create_error_embed(title: &str, description: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title)
        .description(description)
        .color(0xE7_4C_3C)
}

/// Green embed for successful replies
pub fn create_success_embed(title: &str, description: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title)
        .description(description)
        .color(0x2E_CC_71)
}

/// Blue embed for informational replies
pub fn create_info_embed(title: &str, description: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title)
        .description(description)
        .color(0x00_99_FF)
}

/// All application commands and event listeners
pub fn get_all_application_commands() -> Vec<poise::Command<CommandContext, crate::error::Error>> {
    vec![
        // Utility commands
        util::ping(),
        // Calendar commands
        calendar::start(),
        calendar::today(),
        calendar::tomorrow(),
        calendar::week(),
        calendar::calendars(),
    ]
}
