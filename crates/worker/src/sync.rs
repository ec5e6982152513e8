//! The synchronization worker.
//!
//! ```text
//!   start ──> Scanning ──(all guilds done)──> Sleeping{wake_at = cycle_start + interval}
//!                ^                               │  refresh request: refresh those guilds,
//!                └──────(now >= wake_at)─────────┤  keep wake_at
//!                                                └─ shutdown ──> Terminal
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

use accord_core::config::Settings;
use accord_core::{GuildId, Registry};
use accord_db::{Database, StoreError};

use crate::source::Source;
use crate::transport::Transport;
use crate::wake::{Wake, WakeReceiver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub refresh_interval: Duration,
    /// Pause between two deliveries of the same batch.
    pub delivery_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(3600),
            delivery_delay: Duration::from_secs(1),
        }
    }
}

impl From<&Settings> for SyncConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            refresh_interval: settings.refresh_interval,
            delivery_delay: settings.delivery_delay,
        }
    }
}

pub struct SyncWorker {
    pub(crate) db: Database,
    pub(crate) registry: Arc<Registry>,
    pub(crate) source: Arc<dyn Source>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: SyncConfig,
}

impl SyncWorker {
    pub fn new(
        db: Database,
        registry: Arc<Registry>,
        source: Arc<dyn Source>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Self {
        Self {
            db,
            registry,
            source,
            transport,
            config,
        }
    }

    /// Run cycles until shutdown. Only a fatal store error ends the loop early.
    pub async fn run(self, mut wake: WakeReceiver) -> Result<(), StoreError> {
        info!(
            interval = ?self.config.refresh_interval,
            delivery_delay = ?self.config.delivery_delay,
            "sync worker started"
        );

        loop {
            let cycle_start = Instant::now();
            let guilds = self.registry.guild_ids().await;
            info!(guilds = guilds.len(), "cycle started");

            for guild in guilds {
                if wake.is_shutdown() {
                    break;
                }
                self.refresh_guild(guild, &wake).await?;
            }

            let wake_at = cycle_start + self.config.refresh_interval;
            info!(elapsed = ?cycle_start.elapsed(), "cycle finished");

            loop {
                match wake.wait_until(wake_at).await {
                    Wake::Shutdown => {
                        info!("sync worker stopped");
                        return Ok(());
                    }
                    Wake::Refresh(guilds) => {
                        for guild in guilds {
                            if wake.is_shutdown() {
                                break;
                            }
                            self.refresh_guild(guild, &wake).await?;
                        }
                    }
                    Wake::Elapsed => break,
                }
            }
        }
    }

    /// Refresh every subscription of `guild`, stopping early on shutdown.
    /// Store errors other than exhausted retries are logged and skipped.
    pub async fn refresh_guild(
        &self,
        guild: GuildId,
        wake: &WakeReceiver,
    ) -> Result<(), StoreError> {
        for channel in self.registry.channels(guild).await {
            if wake.is_shutdown() {
                break;
            }
            match self.refresh_subscription(guild, channel).await {
                Ok(_) => {}
                Err(err) if err.is_fatal() => {
                    error!(guild = %guild, channel = %channel, error = %err, "cursor could not be stored");
                    return Err(err);
                }
                Err(err) => {
                    error!(guild = %guild, channel = %channel, error = %err, "refresh failed");
                }
            }
        }
        Ok(())
    }
}
