use std::collections::BTreeSet;

use accord_core::{ChannelId, Guild, GuildId, UserId};

use crate::batch::{batch_write_all, BatchStore, WriteRequest};
use crate::error::StoreError;
use crate::records::{guild_key, guild_record, hydrate, subscription_key};
use crate::Database;

/// Store the record of a guild seen for the first time.
pub async fn create(db: &Database, guild: GuildId) -> Result<(), StoreError> {
    put_admins(db, guild, &BTreeSet::new()).await
}

pub async fn put_admins(
    db: &Database,
    guild: GuildId,
    admins: &BTreeSet<UserId>,
) -> Result<(), StoreError> {
    let record = guild_record(guild, admins)?;
    batch_write_all(db.store(), db.policy(), vec![WriteRequest::Put(record)]).await
}

/// Delete the guild record together with the given subscription records.
pub async fn delete(
    db: &Database,
    guild: GuildId,
    channels: &[ChannelId],
) -> Result<(), StoreError> {
    let mut requests = vec![WriteRequest::Delete(guild_key(guild))];
    requests.extend(
        channels
            .iter()
            .map(|channel| WriteRequest::Delete(subscription_key(guild, *channel))),
    );
    batch_write_all(db.store(), db.policy(), requests).await
}

pub async fn load_all(db: &Database) -> Result<Vec<Guild>, StoreError> {
    let records = db.store().scan().await?;
    hydrate(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::subscriptions;
    use accord_core::{Subscription, Tags};

    #[tokio::test]
    async fn test_create_and_load() {
        let db = Database::memory();
        create(&db, GuildId(1)).await.unwrap();
        put_admins(&db, GuildId(2), &BTreeSet::from([UserId(9)]))
            .await
            .unwrap();

        let guilds = load_all(&db).await.unwrap();
        assert_eq!(guilds.len(), 2);
        assert!(guilds[0].admins.is_empty());
        assert_eq!(guilds[1].admins, BTreeSet::from([UserId(9)]));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_subscriptions() {
        let db = Database::memory();
        create(&db, GuildId(1)).await.unwrap();
        create(&db, GuildId(2)).await.unwrap();
        for channel in [10, 11, 12] {
            let sub = Subscription::new(ChannelId(channel), Tags::parse("cat").unwrap());
            subscriptions::put(&db, GuildId(1), &sub).await.unwrap();
        }

        delete(&db, GuildId(1), &[ChannelId(10), ChannelId(11), ChannelId(12)])
            .await
            .unwrap();

        let guilds = load_all(&db).await.unwrap();
        assert_eq!(guilds.len(), 1);
        assert_eq!(guilds[0].id, GuildId(2));
    }
}
