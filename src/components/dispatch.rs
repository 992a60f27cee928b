use crate::error::BotResult;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::debug;

/// Maximum length of a single Discord message
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Delivers text to a user over the chat transport
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, user_id: u64, text: &str) -> BotResult<()>;
}

/// Sends notifications as Discord direct messages
#[derive(Clone)]
pub struct DiscordDispatcher {
    http: Arc<serenity::Http>,
}

impl DiscordDispatcher {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl NotificationDispatcher for DiscordDispatcher {
    async fn send(&self, user_id: u64, text: &str) -> BotResult<()> {
        let channel = serenity::UserId::new(user_id)
            .create_dm_channel(&self.http)
            .await?;

        for chunk in split_message(text, DISCORD_MESSAGE_LIMIT) {
            channel
                .id
                .send_message(&self.http, serenity::CreateMessage::new().content(chunk))
                .await?;
        }

        debug!(user_id, "Direct message sent");
        Ok(())
    }
}

/// Split text on line boundaries into chunks of at most `limit` characters.
///
/// A single line longer than `limit` is cut at character boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if line.chars().count() > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
        } else {
            current.push_str(line);
        }
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}
