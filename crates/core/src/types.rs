use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Maximum number of filter terms a subscription may carry. The source
/// accepts one more, which is taken by the cursor term.
pub const MAX_TAGS: usize = 11;

macro_rules! snowflake {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake!(GuildId);
snowflake!(ChannelId);
snowflake!(UserId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("at least one tag is required")]
    Empty,
    #[error("{count} tags given, at most {max} are allowed", max = MAX_TAGS)]
    TooMany { count: usize },
}

/// Ordered set of filter terms. Insertion order is kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<String>);

impl Tags {
    /// Parse user input: whitespace separated, backticks stripped, repeated
    /// terms dropped after their first occurrence.
    pub fn parse(input: &str) -> Result<Self, TagError> {
        let mut tags: Vec<String> = Vec::new();
        for term in input.split_whitespace() {
            let term: String = term.chars().filter(|c| *c != '`').collect();
            if term.is_empty() || tags.contains(&term) {
                continue;
            }
            tags.push(term);
        }

        if tags.is_empty() {
            return Err(TagError::Empty);
        }
        if tags.len() > MAX_TAGS {
            return Err(TagError::TooMany { count: tags.len() });
        }

        Ok(Self(tags))
    }

    /// Build from already stored terms without re-validating them.
    pub fn from_stored(tags: Vec<String>) -> Self {
        Self(tags)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Terms sent to the source: the stored tags plus `id:>{latest}`.
    pub fn query(&self, latest: u64) -> Vec<String> {
        let mut query = self.0.clone();
        query.push(format!("id:>{}", latest));
        query
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// A channel bound to a tag filter, with its delivery cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub channel_id: ChannelId,
    pub tags: Tags,
    /// Highest item id already delivered, 0 when nothing was delivered yet.
    pub latest: u64,
    /// Number of items ever delivered.
    pub count: u64,
}

impl Subscription {
    pub fn new(channel_id: ChannelId, tags: Tags) -> Self {
        Self {
            channel_id,
            tags,
            latest: 0,
            count: 0,
        }
    }

    pub fn query(&self) -> Vec<String> {
        self.tags.query(self.latest)
    }

    /// One-line summary used by the `list` command.
    pub fn describe(&self) -> String {
        format!(
            "<#{}> [{}] ({}) => `{}`",
            self.channel_id, self.latest, self.count, self.tags
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuildError {
    #[error("channel {0} is already recorded")]
    Duplicate(ChannelId),
    #[error("channel {0} is not recorded")]
    NotFound(ChannelId),
}

/// Per-server state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    pub id: GuildId,
    /// Known from the transport only; never persisted.
    pub owner: Option<UserId>,
    pub admins: BTreeSet<UserId>,
    pub subscriptions: Vec<Subscription>,
}

impl Guild {
    pub fn new(id: GuildId) -> Self {
        Self {
            id,
            owner: None,
            admins: BTreeSet::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn is_authorized(&self, user: UserId) -> bool {
        self.owner == Some(user) || self.admins.contains(&user)
    }

    pub fn subscription(&self, channel: ChannelId) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.channel_id == channel)
    }

    pub fn subscription_mut(&mut self, channel: ChannelId) -> Option<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.channel_id == channel)
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.subscriptions.iter().map(|s| s.channel_id).collect()
    }

    pub fn insert(&mut self, subscription: Subscription) -> Result<(), GuildError> {
        if self.subscription(subscription.channel_id).is_some() {
            return Err(GuildError::Duplicate(subscription.channel_id));
        }
        self.subscriptions.push(subscription);
        Ok(())
    }

    pub fn remove(&mut self, channel: ChannelId) -> Result<Subscription, GuildError> {
        let index = self
            .subscriptions
            .iter()
            .position(|s| s.channel_id == channel)
            .ok_or(GuildError::NotFound(channel))?;
        Ok(self.subscriptions.remove(index))
    }
}

/// A post returned by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub url: String,
}

impl Item {
    /// Text sent to the channel for this item.
    pub fn message(&self) -> String {
        format!("{} {}", self.created_at.format("%Y-%m-%d %H:%M UTC"), self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_strips_backticks() {
        let tags = Tags::parse("`rating:g` ``solo`` 1girl").unwrap();
        assert_eq!(tags.as_slice(), ["rating:g", "solo", "1girl"]);
    }

    #[test]
    fn test_parse_keeps_first_occurrence_order() {
        let tags = Tags::parse("b a b c a").unwrap();
        assert_eq!(tags.as_slice(), ["b", "a", "c"]);
        assert_eq!(tags.to_string(), "b a c");
    }

    #[test]
    fn test_parse_drops_terms_made_only_of_backticks() {
        let tags = Tags::parse("``` cat").unwrap();
        assert_eq!(tags.as_slice(), ["cat"]);
    }

    #[test]
    fn test_parse_rejects_empty_input() {
        assert_eq!(Tags::parse("   "), Err(TagError::Empty));
        assert_eq!(Tags::parse("`` `"), Err(TagError::Empty));
    }

    #[test]
    fn test_parse_limits_tag_count() {
        let eleven = (0..11).map(|i| format!("t{}", i)).collect::<Vec<_>>().join(" ");
        assert_eq!(Tags::parse(&eleven).unwrap().len(), 11);

        let twelve = format!("{} t11", eleven);
        assert_eq!(Tags::parse(&twelve), Err(TagError::TooMany { count: 12 }));
    }

    #[test]
    fn test_query_appends_cursor_term() {
        let tags = Tags::parse("cat dog").unwrap();
        assert_eq!(tags.query(0), ["cat", "dog", "id:>0"]);
        assert_eq!(tags.query(1234), ["cat", "dog", "id:>1234"]);
        // stored tags are left untouched
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_subscription_describe() {
        let mut sub = Subscription::new(ChannelId(42), Tags::parse("cat dog").unwrap());
        sub.latest = 900;
        sub.count = 3;
        assert_eq!(sub.describe(), "<#42> [900] (3) => `cat dog`");
    }

    #[test]
    fn test_guild_rejects_duplicate_channel() {
        let mut guild = Guild::new(GuildId(1));
        guild
            .insert(Subscription::new(ChannelId(7), Tags::parse("cat").unwrap()))
            .unwrap();

        let result = guild.insert(Subscription::new(ChannelId(7), Tags::parse("dog").unwrap()));
        assert_eq!(result, Err(GuildError::Duplicate(ChannelId(7))));
        assert_eq!(guild.subscriptions.len(), 1);
        assert_eq!(guild.subscriptions[0].tags.as_slice(), ["cat"]);
    }

    #[test]
    fn test_guild_remove() {
        let mut guild = Guild::new(GuildId(1));
        guild
            .insert(Subscription::new(ChannelId(7), Tags::parse("cat").unwrap()))
            .unwrap();

        assert_eq!(guild.remove(ChannelId(8)), Err(GuildError::NotFound(ChannelId(8))));
        let removed = guild.remove(ChannelId(7)).unwrap();
        assert_eq!(removed.channel_id, ChannelId(7));
        assert!(guild.subscriptions.is_empty());
    }

    #[test]
    fn test_guild_authorization() {
        let mut guild = Guild::new(GuildId(1));
        assert!(!guild.is_authorized(UserId(10)));

        guild.owner = Some(UserId(10));
        guild.admins.insert(UserId(20));
        assert!(guild.is_authorized(UserId(10)));
        assert!(guild.is_authorized(UserId(20)));
        assert!(!guild.is_authorized(UserId(30)));
    }

    #[test]
    fn test_item_message() {
        let item = Item {
            id: 5,
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap(),
            url: "https://danbooru.donmai.us/posts/5".to_string(),
        };
        assert_eq!(
            item.message(),
            "2024-03-09 14:05 UTC https://danbooru.donmai.us/posts/5"
        );
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&UserId(99)).unwrap();
        assert_eq!(json, "99");
        let parsed: UserId = serde_json::from_str("99").unwrap();
        assert_eq!(parsed, UserId(99));
    }
}
