use accord_core::{ChannelId, GuildId, Subscription};

use crate::batch::{batch_get_all, batch_write_all, WriteRequest};
use crate::error::StoreError;
use crate::records::{subscription_key, subscription_record, SubscriptionRecord};
use crate::Database;

/// Insert or overwrite one subscription, cursor included.
pub async fn put(db: &Database, guild: GuildId, sub: &Subscription) -> Result<(), StoreError> {
    let record = subscription_record(guild, sub)?;
    batch_write_all(db.store(), db.policy(), vec![WriteRequest::Put(record)]).await
}

pub async fn delete(db: &Database, guild: GuildId, channel: ChannelId) -> Result<(), StoreError> {
    batch_write_all(
        db.store(),
        db.policy(),
        vec![WriteRequest::Delete(subscription_key(guild, channel))],
    )
    .await
}

/// Stored `(latest, count)` of one subscription.
pub async fn cursor(
    db: &Database,
    guild: GuildId,
    channel: ChannelId,
) -> Result<Option<(u64, u64)>, StoreError> {
    let records = batch_get_all(db.store(), db.policy(), vec![subscription_key(guild, channel)]).await?;
    match records.into_iter().next() {
        Some(record) => {
            let parsed: SubscriptionRecord = serde_json::from_value(record.value)?;
            Ok(Some((parsed.latest, parsed.count)))
        }
        None => Ok(None),
    }
}
