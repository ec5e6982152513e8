//! One refresh of one subscription: count, page, order, deliver, then store
//! the cursor no matter how delivery went.

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};

use accord_core::{ChannelId, GuildId, Item, Subscription};
use accord_db::queries::subscriptions;
use accord_db::StoreError;

use crate::source::page_count;
use crate::sync::SyncWorker;
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Items left after ordering and filtering.
    pub fetched: usize,
    pub delivered: u64,
    /// Cursor after the refresh.
    pub latest: u64,
}

/// How far delivery got before it stopped.
#[derive(Debug, Clone, Copy)]
struct Progress {
    latest: u64,
    delivered: u64,
}

/// Ascending by id, only ids past `latest`, each id once.
pub fn order_batch(mut batch: Vec<Item>, latest: u64) -> Vec<Item> {
    batch.retain(|item| item.id > latest);
    batch.sort_by_key(|item| item.id);
    batch.dedup_by_key(|item| item.id);
    batch
}

impl SyncWorker {
    pub async fn refresh_subscription(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<RefreshOutcome, StoreError> {
        let Some(snapshot) = self.registry.subscription(guild, channel).await else {
            debug!(guild = %guild, channel = %channel, "subscription gone, skipping");
            return Ok(RefreshOutcome::default());
        };

        let query = snapshot.query();
        let count = self.source.count(&query).await;
        if count == 0 {
            return Ok(RefreshOutcome {
                latest: snapshot.latest,
                ..RefreshOutcome::default()
            });
        }

        let mut batch = Vec::new();
        for page in 1..=page_count(count) {
            batch.extend(self.source.fetch_page(&query, page).await);
        }
        let batch = order_batch(batch, snapshot.latest);
        if batch.is_empty() {
            return Ok(RefreshOutcome {
                latest: snapshot.latest,
                ..RefreshOutcome::default()
            });
        }
        debug!(guild = %guild, channel = %channel, count, items = batch.len(), "delivering");

        let mut progress = Progress {
            latest: snapshot.latest,
            delivered: 0,
        };
        let delivery = AssertUnwindSafe(self.deliver(channel, &batch, &mut progress))
            .catch_unwind()
            .await;

        // Runs whatever happened above, so items already sent are never sent again.
        let latest = self.persist(guild, &snapshot, progress).await?;

        match delivery {
            Ok(Ok(())) => info!(
                guild = %guild,
                channel = %channel,
                delivered = progress.delivered,
                latest,
                "subscription refreshed"
            ),
            Ok(Err(err)) => error!(
                guild = %guild,
                channel = %channel,
                delivered = progress.delivered,
                error = %err,
                details = ?err,
                "delivery failed"
            ),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(
                    guild = %guild,
                    channel = %channel,
                    delivered = progress.delivered,
                    panic = %message,
                    "delivery panicked"
                );
            }
        }

        Ok(RefreshOutcome {
            fetched: batch.len(),
            delivered: progress.delivered,
            latest,
        })
    }

    async fn deliver(
        &self,
        channel: ChannelId,
        batch: &[Item],
        progress: &mut Progress,
    ) -> Result<(), TransportError> {
        for (i, item) in batch.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.delivery_delay).await;
            }
            self.transport.send(channel, &item.message()).await?;
            progress.latest = item.id;
            progress.delivered += 1;
        }
        Ok(())
    }

    /// Store the cursor, storage first, then memory. The cursor never moves
    /// back, and a subscription removed or re-recorded meanwhile is left alone.
    /// Memory advances even when the write fails so the batch is not sent again.
    async fn persist(
        &self,
        guild: GuildId,
        snapshot: &Subscription,
        progress: Progress,
    ) -> Result<u64, StoreError> {
        let channel = snapshot.channel_id;
        let mut guilds = self.registry.lock().await;
        let Some(current) = guilds
            .get_mut(&guild)
            .and_then(|g| g.subscription_mut(channel))
        else {
            warn!(guild = %guild, channel = %channel, "subscription removed during delivery");
            return Ok(progress.latest);
        };
        if current.tags != snapshot.tags {
            warn!(guild = %guild, channel = %channel, "subscription replaced during delivery");
            return Ok(progress.latest);
        }

        let mut updated = current.clone();
        updated.latest = updated.latest.max(progress.latest);
        updated.count += progress.delivered;

        let stored = subscriptions::put(&self.db, guild, &updated).await;
        *current = updated;
        stored?;
        Ok(current.latest)
    }
}
