//! Joining and leaving guilds.

use tracing::info;

use accord_core::{Guild, GuildId, UserId};
use accord_db::queries::guilds;
use accord_db::StoreError;

use crate::state::BotState;

/// Record a guild the bot is in. Known guilds only get their owner updated.
/// Returns whether the guild was new.
pub async fn join(
    state: &BotState,
    guild: GuildId,
    owner: Option<UserId>,
) -> Result<bool, StoreError> {
    let mut registry = state.registry.lock().await;
    if let Some(existing) = registry.get_mut(&guild) {
        if owner.is_some() {
            existing.owner = owner;
        }
        return Ok(false);
    }

    guilds::create(&state.db, guild).await?;
    let mut joined = Guild::new(guild);
    joined.owner = owner;
    registry.insert(guild, joined);

    info!(guild = %guild, "joined guild");
    Ok(true)
}

/// Forget a guild and every subscription it owns.
pub async fn leave(state: &BotState, guild: GuildId) -> Result<bool, StoreError> {
    let mut registry = state.registry.lock().await;
    let Some(existing) = registry.get(&guild) else {
        return Ok(false);
    };

    let channels = existing.channels();
    guilds::delete(&state.db, guild, &channels).await?;
    registry.remove(&guild);

    info!(guild = %guild, subscriptions = channels.len(), "left guild");
    Ok(true)
}

/// Bring stored guilds in line with the guilds the bot is actually in.
pub async fn reconcile(state: &BotState, current: &[GuildId]) -> Result<(), StoreError> {
    let known = state.registry.guild_ids().await;

    for guild in known.iter().filter(|g| !current.contains(g)) {
        leave(state, *guild).await?;
    }
    for guild in current.iter().filter(|g| !known.contains(g)) {
        join(state, *guild, None).await?;
    }
    Ok(())
}
