//! Mapping between in-memory guilds and table records.
//!
//! ```text
//! (guild_id, "guild")              -> {"admins": [user_id, ...]}
//! (guild_id, "channel#<channel>")  -> {"tags": [...], "latest": n, "count": n}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use accord_core::{ChannelId, Guild, GuildId, Subscription, Tags, UserId};

use crate::batch::{Record, RecordKey};
use crate::error::StoreError;

pub const GUILD_SORT_KEY: &str = "guild";
pub const CHANNEL_SORT_PREFIX: &str = "channel#";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GuildRecord {
    #[serde(default)]
    pub admins: BTreeSet<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub tags: Vec<String>,
    #[serde(default)]
    pub latest: u64,
    #[serde(default)]
    pub count: u64,
}

pub fn guild_key(guild: GuildId) -> RecordKey {
    RecordKey::new(guild.to_string(), GUILD_SORT_KEY)
}

pub fn subscription_key(guild: GuildId, channel: ChannelId) -> RecordKey {
    RecordKey::new(guild.to_string(), format!("{}{}", CHANNEL_SORT_PREFIX, channel))
}

pub fn guild_record(guild: GuildId, admins: &BTreeSet<UserId>) -> Result<Record, StoreError> {
    let value = serde_json::to_value(GuildRecord {
        admins: admins.clone(),
    })?;
    Ok(Record {
        key: guild_key(guild),
        value,
    })
}

pub fn subscription_record(guild: GuildId, sub: &Subscription) -> Result<Record, StoreError> {
    let value = serde_json::to_value(SubscriptionRecord {
        tags: sub.tags.as_slice().to_vec(),
        latest: sub.latest,
        count: sub.count,
    })?;
    Ok(Record {
        key: subscription_key(guild, sub.channel_id),
        value,
    })
}

fn malformed(key: &RecordKey, reason: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        partition: key.partition.clone(),
        sort: key.sort.clone(),
        reason: reason.into(),
    }
}

/// Rebuild guilds from a full table scan. Rows are grouped by partition;
/// unknown sort keys are skipped with a warning.
pub fn hydrate(records: Vec<Record>) -> Result<Vec<Guild>, StoreError> {
    let mut guilds: BTreeMap<GuildId, (Option<GuildRecord>, Vec<Subscription>)> = BTreeMap::new();

    for record in records {
        let key = &record.key;
        let id: u64 = key
            .partition
            .parse()
            .map_err(|_| malformed(key, "partition key is not a guild id"))?;
        let entry = guilds.entry(GuildId(id)).or_default();

        if key.sort == GUILD_SORT_KEY {
            let parsed: GuildRecord = serde_json::from_value(record.value.clone())
                .map_err(|e| malformed(key, e.to_string()))?;
            entry.0 = Some(parsed);
        } else if let Some(channel) = key.sort.strip_prefix(CHANNEL_SORT_PREFIX) {
            let channel: u64 = channel
                .parse()
                .map_err(|_| malformed(key, "sort key is not a channel id"))?;
            let parsed: SubscriptionRecord = serde_json::from_value(record.value.clone())
                .map_err(|e| malformed(key, e.to_string()))?;
            entry.1.push(Subscription {
                channel_id: ChannelId(channel),
                tags: Tags::from_stored(parsed.tags),
                latest: parsed.latest,
                count: parsed.count,
            });
        } else {
            warn!(partition = %key.partition, sort = %key.sort, "skipping unknown record");
        }
    }

    Ok(guilds
        .into_iter()
        .map(|(id, (record, subscriptions))| {
            let mut guild = Guild::new(id);
            match record {
                Some(record) => guild.admins = record.admins,
                None => warn!(guild = %id, "subscriptions found without a guild record"),
            }
            guild.subscriptions = subscriptions;
            guild
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_layout() {
        assert_eq!(guild_key(GuildId(1)), RecordKey::new("1", "guild"));
        assert_eq!(
            subscription_key(GuildId(1), ChannelId(22)),
            RecordKey::new("1", "channel#22")
        );
    }

    #[test]
    fn test_subscription_record_value() {
        let mut sub = Subscription::new(ChannelId(22), Tags::parse("cat dog").unwrap());
        sub.latest = 90;
        sub.count = 4;

        let record = subscription_record(GuildId(1), &sub).unwrap();
        assert_eq!(
            record.value,
            json!({ "tags": ["cat", "dog"], "latest": 90, "count": 4 })
        );
    }

    #[test]
    fn test_hydrate_groups_by_guild() {
        let records = vec![
            Record {
                key: RecordKey::new("1", "guild"),
                value: json!({ "admins": [5, 6] }),
            },
            Record {
                key: RecordKey::new("1", "channel#10"),
                value: json!({ "tags": ["cat"], "latest": 3, "count": 1 }),
            },
            Record {
                key: RecordKey::new("2", "guild"),
                value: json!({ "admins": [] }),
            },
        ];

        let guilds = hydrate(records).unwrap();
        assert_eq!(guilds.len(), 2);
        assert_eq!(guilds[0].id, GuildId(1));
        assert!(guilds[0].admins.contains(&UserId(6)));
        assert_eq!(guilds[0].subscriptions.len(), 1);
        assert_eq!(guilds[0].subscriptions[0].latest, 3);
        assert_eq!(guilds[0].owner, None);
        assert!(guilds[1].subscriptions.is_empty());
    }

    #[test]
    fn test_hydrate_orphan_subscription_creates_guild() {
        let guilds = hydrate(vec![Record {
            key: RecordKey::new("3", "channel#10"),
            value: json!({ "tags": ["cat"] }),
        }])
        .unwrap();

        assert_eq!(guilds.len(), 1);
        assert!(guilds[0].admins.is_empty());
        assert_eq!(guilds[0].subscriptions[0].latest, 0);
        assert_eq!(guilds[0].subscriptions[0].count, 0);
    }

    #[test]
    fn test_hydrate_rejects_bad_keys() {
        let err = hydrate(vec![Record {
            key: RecordKey::new("abc", "guild"),
            value: json!({}),
        }])
        .unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));

        let err = hydrate(vec![Record {
            key: RecordKey::new("1", "channel#x"),
            value: json!({ "tags": [] }),
        }])
        .unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }
}
