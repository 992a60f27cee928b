use crate::commands::{create_info_embed, CommandResult, Context};
use crate::components::dispatch::{split_message, DISCORD_MESSAGE_LIMIT};
use crate::components::google_calendar::format::{
    render_day, render_week, LABEL_TODAY, LABEL_TOMORROW,
};
use crate::components::google_calendar::CalendarEvent;
use crate::error::Error;
use crate::utils::time::local_date_offset;
use chrono::NaiveDate;
use rust_i18n::t;
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

/// Show the available commands
#[poise::command(slash_command, prefix_command, aliases("help"))]
pub async fn start(ctx: Context<'_>) -> CommandResult {
    let user_id = ctx.author().id.get();
    let name = ctx
        .data()
        .config()
        .user_schedule(user_id)
        .map(|s| s.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| t!("default_name").to_string());

    ctx.send(poise::CreateReply::default().embed(create_info_embed(
        &t!("start_title", name = name),
        &t!("start_commands", user_id = user_id),
    )))
    .await?;
    Ok(())
}

/// Show today's calendar events
#[poise::command(slash_command, prefix_command)]
pub async fn today(ctx: Context<'_>) -> CommandResult {
    send_day(ctx, 0, LABEL_TODAY).await
}

/// Show tomorrow's calendar events
#[poise::command(slash_command, prefix_command)]
pub async fn tomorrow(ctx: Context<'_>) -> CommandResult {
    send_day(ctx, 1, LABEL_TOMORROW).await
}

/// Show the calendar events of the next seven days
#[poise::command(slash_command, prefix_command)]
pub async fn week(ctx: Context<'_>) -> CommandResult {
    let user_id = ctx.author().id.get();
    let data = ctx.data();

    let tz = match data.aggregator.user_timezone(user_id) {
        Ok(tz) => tz,
        Err(e) => return refuse(ctx, e).await,
    };
    let start_date = local_date_offset(data.clock.now(), tz, 0);

    ctx.defer().await?;
    let days = match data.aggregator.aggregate_week(user_id, start_date).await {
        Ok(days) => days,
        Err(e) => return refuse(ctx, e).await,
    };

    let mut failed = BTreeSet::new();
    let days: Vec<(NaiveDate, Vec<CalendarEvent>)> = days
        .into_iter()
        .map(|(date, result)| {
            failed.extend(result.failed_sources);
            (date, result.events)
        })
        .collect();

    log_partial(user_id, &failed);
    reply_chunked(ctx, &render_week(&days, tz)).await
}

/// List the calendars available to the linked Google account
#[poise::command(slash_command, prefix_command)]
pub async fn calendars(ctx: Context<'_>) -> CommandResult {
    let user_id = ctx.author().id.get();
    let data = ctx.data();

    if !data.credentials.has_linked_credential(user_id) {
        return refuse(ctx, Error::NotLinked(user_id)).await;
    }

    ctx.defer().await?;
    let listed = match data.credentials.get_credential(user_id).await {
        Ok(credential) => data.calendar_client.list_calendars(&credential).await,
        Err(e) => Err(e),
    };

    let calendars = match listed {
        Ok(calendars) => calendars,
        Err(e) => {
            error!(user_id, error = %e, "Failed to list calendars");
            ctx.say(t!("calendar_list_failed")).await?;
            return Ok(());
        }
    };

    let mut message = t!("calendar_list_title").to_string();
    message.push_str("\n\n");
    for (id, name) in &calendars {
        message.push_str(&format!("• {}\n  ID: `{}`\n\n", name, id));
    }
    message.push_str(&t!("calendar_list_hint"));

    reply_chunked(ctx, &message).await
}

/// Aggregate and reply with the digest of today plus `offset` days
async fn send_day(ctx: Context<'_>, offset: i64, label: &str) -> CommandResult {
    let user_id = ctx.author().id.get();
    let data = ctx.data();

    let tz = match data.aggregator.user_timezone(user_id) {
        Ok(tz) => tz,
        Err(e) => return refuse(ctx, e).await,
    };
    let date = local_date_offset(data.clock.now(), tz, offset);

    ctx.defer().await?;
    let result = match data.aggregator.aggregate(user_id, date).await {
        Ok(result) => result,
        Err(e) => return refuse(ctx, e).await,
    };
    debug!(user_id, %date, count = result.events.len(), "Digest aggregated");

    log_partial(user_id, &result.failed_sources);
    reply_chunked(ctx, &render_day(&result.events, date, label, tz)).await
}

/// Reply to a failed pre-flight or credential step
async fn refuse(ctx: Context<'_>, error: Error) -> CommandResult {
    let reply = match &error {
        Error::NotLinked(_) => t!("calendar_not_linked"),
        Error::UserNotFound(_) => t!("calendar_user_not_found"),
        Error::InvalidTimezone(timezone) => {
            t!("calendar_invalid_timezone", timezone = timezone)
        }
        other => {
            error!(user_id = ctx.author().id.get(), error = %other, "Failed to fetch events");
            t!("calendar_error_fetching")
        }
    };

    ctx.send(poise::CreateReply::default().content(reply).ephemeral(true))
        .await?;
    Ok(())
}

/// Missing calendars are only logged; the reply shows what was fetched
fn log_partial(user_id: u64, failed: &BTreeSet<String>) {
    if !failed.is_empty() {
        warn!(user_id, failed = ?failed, "Replying with partial results");
    }
}

async fn reply_chunked(ctx: Context<'_>, message: &str) -> CommandResult {
    for chunk in split_message(message, DISCORD_MESSAGE_LIMIT) {
        ctx.say(chunk).await?;
    }
    Ok(())
}
