//! In-memory guild collection shared by command handlers and the sync worker.
//!
//! One process-wide lock guards every guild. Callers that mutate a guild hold
//! the guard across the matching store write so that memory and storage change
//! together.

use std::collections::BTreeMap;
use tokio::sync::{Mutex, MutexGuard};

use crate::types::{ChannelId, Guild, GuildId, Subscription};

pub type Guilds = BTreeMap<GuildId, Guild>;

#[derive(Debug, Default)]
pub struct Registry {
    guilds: Mutex<Guilds>,
}

impl Registry {
    pub fn new(guilds: impl IntoIterator<Item = Guild>) -> Self {
        Self {
            guilds: Mutex::new(guilds.into_iter().map(|g| (g.id, g)).collect()),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Guilds> {
        self.guilds.lock().await
    }

    pub async fn guild_ids(&self) -> Vec<GuildId> {
        self.guilds.lock().await.keys().copied().collect()
    }

    /// Channels subscribed in `guild`, empty if the guild is unknown.
    pub async fn channels(&self, guild: GuildId) -> Vec<ChannelId> {
        self.guilds
            .lock()
            .await
            .get(&guild)
            .map(Guild::channels)
            .unwrap_or_default()
    }

    /// Copy of one subscription, taken so the caller can work without the lock.
    pub async fn subscription(&self, guild: GuildId, channel: ChannelId) -> Option<Subscription> {
        self.guilds
            .lock()
            .await
            .get(&guild)
            .and_then(|g| g.subscription(channel))
            .cloned()
    }
}
