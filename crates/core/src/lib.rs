pub mod config;
pub mod registry;
pub mod types;

pub use registry::Registry;
pub use types::{ChannelId, Guild, GuildId, Item, Subscription, Tags, UserId};
