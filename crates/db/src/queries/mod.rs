pub mod guilds;
pub mod subscriptions;
