use tracing::info;

use accord_core::UserId;
use accord_db::queries::guilds;

use super::{authorize, Caller};
use crate::error::{CommandError, CommandResult};
use crate::state::BotState;

pub async fn add(state: &BotState, caller: Caller, user: UserId) -> CommandResult {
    let mut registry = state.registry.lock().await;
    let guild = registry
        .get_mut(&caller.guild)
        .ok_or(CommandError::UnknownGuild)?;
    authorize(guild, caller.user)?;
    if guild.admins.contains(&user) {
        return Err(CommandError::AdminExists(user));
    }

    let mut admins = guild.admins.clone();
    admins.insert(user);
    guilds::put_admins(&state.db, caller.guild, &admins).await?;
    guild.admins = admins;

    info!(guild = %caller.guild, user = %user, "admin added");
    Ok(format!("<@{}> is now an admin.", user))
}

pub async fn remove(state: &BotState, caller: Caller, user: UserId) -> CommandResult {
    let mut registry = state.registry.lock().await;
    let guild = registry
        .get_mut(&caller.guild)
        .ok_or(CommandError::UnknownGuild)?;
    authorize(guild, caller.user)?;
    if !guild.admins.contains(&user) {
        return Err(CommandError::AdminNotFound(user));
    }

    let mut admins = guild.admins.clone();
    admins.remove(&user);
    guilds::put_admins(&state.db, caller.guild, &admins).await?;
    guild.admins = admins;

    info!(guild = %caller.guild, user = %user, "admin removed");
    Ok(format!("<@{}> is no longer an admin.", user))
}

pub async fn list(state: &BotState, caller: Caller) -> CommandResult {
    let registry = state.registry.lock().await;
    let guild = registry
        .get(&caller.guild)
        .ok_or(CommandError::UnknownGuild)?;

    let mut lines = Vec::with_capacity(guild.admins.len() + 1);
    if let Some(owner) = guild.owner {
        lines.push(format!("Owner: <@{}>", owner));
    }
    if guild.admins.is_empty() {
        lines.push("No admins.".to_string());
    } else {
        lines.extend(guild.admins.iter().map(|user| format!("<@{}>", user)));
    }
    Ok(lines.join("\n"))
}
