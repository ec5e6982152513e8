use tracing::{info, warn};

use accord_core::{ChannelId, Subscription, Tags};
use accord_db::queries::subscriptions;

use super::{authorize, Caller};
use crate::error::{CommandError, CommandResult};
use crate::state::BotState;

/// Subscribe `channel` to `raw_tags` and queue a refresh so the first batch
/// arrives without waiting for the next cycle.
pub async fn record(
    state: &BotState,
    caller: Caller,
    channel: ChannelId,
    raw_tags: &str,
) -> CommandResult {
    let tags = Tags::parse(raw_tags)?;

    let mut guilds = state.registry.lock().await;
    let guild = guilds
        .get_mut(&caller.guild)
        .ok_or(CommandError::UnknownGuild)?;
    authorize(guild, caller.user)?;
    if guild.subscription(channel).is_some() {
        return Err(CommandError::Duplicate(channel));
    }

    let subscription = Subscription::new(channel, tags);
    subscriptions::put(&state.db, caller.guild, &subscription).await?;
    let reply = format!("Recorded <#{}> with `{}`.", channel, subscription.tags);
    guild.insert(subscription)?;
    drop(guilds);

    info!(guild = %caller.guild, channel = %channel, "subscription recorded");
    if !state.wake.request(caller.guild) {
        warn!(guild = %caller.guild, "sync worker is not running");
    }
    Ok(reply)
}

pub async fn remove(state: &BotState, caller: Caller, channel: ChannelId) -> CommandResult {
    let mut guilds = state.registry.lock().await;
    let guild = guilds
        .get_mut(&caller.guild)
        .ok_or(CommandError::UnknownGuild)?;
    authorize(guild, caller.user)?;
    if guild.subscription(channel).is_none() {
        return Err(CommandError::NotFound(channel));
    }

    subscriptions::delete(&state.db, caller.guild, channel).await?;
    guild.remove(channel)?;

    info!(guild = %caller.guild, channel = %channel, "subscription removed");
    Ok(format!("Removed <#{}>.", channel))
}

pub async fn list(state: &BotState, caller: Caller) -> CommandResult {
    let guilds = state.registry.lock().await;
    let guild = guilds.get(&caller.guild).ok_or(CommandError::UnknownGuild)?;

    if guild.subscriptions.is_empty() {
        return Ok("No channels recorded.".to_string());
    }
    Ok(guild
        .subscriptions
        .iter()
        .map(Subscription::describe)
        .collect::<Vec<_>>()
        .join("\n"))
}

pub async fn refresh(state: &BotState, caller: Caller) -> CommandResult {
    {
        let guilds = state.registry.lock().await;
        let guild = guilds.get(&caller.guild).ok_or(CommandError::UnknownGuild)?;
        authorize(guild, caller.user)?;
    }

    if !state.wake.request(caller.guild) {
        warn!(guild = %caller.guild, "sync worker is not running");
        return Ok("Refresh could not be queued, the sync worker is not running.".to_string());
    }
    Ok("Refresh queued.".to_string())
}
