use crate::commands::{create_error_embed, get_all_application_commands, CommandContext};
use crate::components::google_calendar::{
    Aggregator, CredentialStore, GoogleCalendarClient, GoogleCredentialStore, SourceClient,
};
use crate::components::reminders::{build_schedule, NotificationHandler, TriggerScheduler};
use crate::components::{DiscordDispatcher, NotificationDispatcher};
use crate::config::Config;
use crate::error::Error;
use crate::shutdown;
use crate::utils::clock::{Clock, SystemClock};
use poise::serenity_prelude as serenity;
use rust_i18n::t;
use serenity::model::user::OnlineStatus;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,serenity=warn,poise=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<Config>> {
    match Config::load() {
        Ok(config) => {
            info!(
                "Loaded {} users, {} allowed",
                config.users.len(),
                config.allowed_user_ids.len()
            );
            Ok(Arc::new(config))
        }
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Initialize and start the Discord bot
pub async fn start_bot(config: Arc<Config>) -> miette::Result<()> {
    let token = config.discord_token.clone();
    let activity = config.activity.clone();

    // Shared calendar services
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let credentials: Arc<dyn CredentialStore> =
        Arc::new(GoogleCredentialStore::new(Arc::clone(&config))?);
    let calendar_client = Arc::new(GoogleCalendarClient::new());
    let source: Arc<dyn SourceClient> = calendar_client.clone();
    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&config),
        Arc::clone(&credentials),
        source,
    ));

    let command_data = CommandContext::new(
        Arc::clone(&aggregator),
        Arc::clone(&calendar_client),
        Arc::clone(&credentials),
        Arc::clone(&clock),
    );

    // Set up framework options
    let options = poise::FrameworkOptions {
        commands: get_all_application_commands(),
        on_error: |error| Box::pin(on_error(error)),
        command_check: Some(|ctx| {
            Box::pin(async move {
                let user_id = ctx.author().id.get();
                if ctx.data().config().is_user_allowed(user_id) {
                    Ok(true)
                } else {
                    info!(user_id, "Refusing command from user not on the allowlist");
                    Err(Error::Unauthorized(user_id))
                }
            })
        }),
        prefix_options: poise::PrefixFrameworkOptions {
            prefix: Some("!".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    // Set intents
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::DIRECT_MESSAGES;

    // Create framework with new poise API
    let client_result = serenity::ClientBuilder::new(token, intents)
        .framework(poise::Framework::new(options, move |ctx, ready, framework| {
            Box::pin(async move {
                info!("{} is connected!", ready.user.name);

                // Set the bot's status
                ctx.set_presence(
                    Some(serenity::ActivityData::playing(&activity)),
                    OnlineStatus::Online,
                );
                info!("Setting activity to {}", activity);

                // Register slash commands
                if let Err(e) =
                    poise::builtins::register_globally(ctx, &framework.options().commands).await
                {
                    error!("Failed to register slash commands: {:?}", e);
                } else {
                    info!("Slash commands registered successfully");
                }

                Ok(command_data)
            })
        }))
        .await;

    info!("Starting bot...");
    let mut client = client_result.map_err(Error::from)?;

    // Scheduled messages only need the REST client
    let dispatcher: Arc<dyn NotificationDispatcher> =
        Arc::new(DiscordDispatcher::new(client.http.clone()));
    let handler = Arc::new(NotificationHandler::new(
        Arc::clone(&aggregator),
        dispatcher,
        Arc::clone(&clock),
    ));
    let triggers = build_schedule(&config.schedules(), credentials.as_ref());
    let scheduler = TriggerScheduler::new(triggers, handler, clock).start();

    // Create shutdown channel
    let (shutdown_send, shutdown_recv) = oneshot::channel();

    // Spawn signal handler task
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        shutdown::handle_signals(shutdown_send, scheduler, shard_manager).await;
    });

    // Create a separate task to handle the client
    let client_handle = tokio::spawn(async move {
        if let Err(e) = client.start().await {
            Err(Error::from(e))
        } else {
            Ok(())
        }
    });

    // Wait for either the client to end or a shutdown signal
    tokio::select! {
        result = client_handle => {
            info!("Bot process ended");
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => {
                    error!("Client task error: {:?}", e);
                    Err(Error::Other(format!("Client task error: {}", e)).into())
                }
            }
        }
        _ = shutdown_recv => {
            info!("Received shutdown signal, shutting down bot...");
            Ok(())
        }
    }
}

/// Handle errors from commands
async fn on_error(error: poise::FrameworkError<'_, CommandContext, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Error during setup: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command '{}': {:?}", ctx.command().name, error);
            if let Err(e) = ctx
                .send(
                    poise::CreateReply::default()
                        .embed(create_error_embed(
                            &t!("error_title", context = "command"),
                            &format!("{}", error),
                        ))
                        .ephemeral(true),
                )
                .await
            {
                error!("Error while sending error message: {:?}", e);
            }
        }
        poise::FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            if let Some(error) = error {
                if let Err(e) = ctx
                    .send(
                        poise::CreateReply::default()
                            .embed(create_error_embed(
                                &t!("error_title", context = "check"),
                                &t!("unauthorized"),
                            ))
                            .ephemeral(true),
                    )
                    .await
                {
                    error!("Error while sending error message: {:?}", e);
                }
                tracing::debug!("Command check failed: {:?}", error);
            }
        }
        error => {
            error!("Other error: {:?}", error);
        }
    }
}
