use thiserror::Error;

use accord_core::types::{GuildError, TagError};
use accord_core::{ChannelId, UserId};
use accord_db::StoreError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("caller is neither the owner nor an admin")]
    Unauthorized,
    #[error("command used outside a guild")]
    NotInGuild,
    #[error("guild is not known yet")]
    UnknownGuild,
    #[error("invalid tags: {0}")]
    InvalidTags(#[from] TagError),
    #[error("channel {0} is already recorded")]
    Duplicate(ChannelId),
    #[error("channel {0} is not recorded")]
    NotFound(ChannelId),
    #[error("user {0} is already an admin")]
    AdminExists(UserId),
    #[error("user {0} is not an admin")]
    AdminNotFound(UserId),
    #[error("missing option {0}")]
    MissingOption(&'static str),
    #[error("unknown command {0}")]
    UnknownCommand(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GuildError> for CommandError {
    fn from(err: GuildError) -> Self {
        match err {
            GuildError::Duplicate(channel) => CommandError::Duplicate(channel),
            GuildError::NotFound(channel) => CommandError::NotFound(channel),
        }
    }
}

impl CommandError {
    /// Reply shown to the person who ran the command.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Unauthorized => {
                "Only the server owner or a bot admin can do that.".to_string()
            }
            CommandError::NotInGuild => "Commands only work inside a server.".to_string(),
            CommandError::UnknownGuild => {
                "This server is not set up yet, try again in a moment.".to_string()
            }
            CommandError::InvalidTags(err) => format!("Invalid tags: {}.", err),
            CommandError::Duplicate(channel) => format!(
                "<#{}> is already recorded. Remove it first to change its tags.",
                channel
            ),
            CommandError::NotFound(channel) => format!("<#{}> is not recorded.", channel),
            CommandError::AdminExists(user) => format!("<@{}> is already an admin.", user),
            CommandError::AdminNotFound(user) => format!("<@{}> is not an admin.", user),
            CommandError::MissingOption(name) => format!("Missing option `{}`.", name),
            CommandError::UnknownCommand(name) => format!("Unknown command `{}`.", name),
            CommandError::Store(_) => "Could not save that change, please try again.".to_string(),
        }
    }
}

pub type CommandResult = Result<String, CommandError>;
