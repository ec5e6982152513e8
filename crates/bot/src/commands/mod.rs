//! Slash commands, independent of the chat library.
//!
//! The Discord layer turns an interaction into an [`Invocation`] of resolved
//! option values; everything below works on those.

pub mod admin;
pub mod subscriptions;

use accord_core::{ChannelId, Guild, GuildId, UserId};

use crate::error::{CommandError, CommandResult};
use crate::state::BotState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Channel(ChannelId),
    User(UserId),
    String(String),
}

/// A command as received, with its options already resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub subcommand: Option<String>,
    pub options: Vec<(String, OptionValue)>,
}

impl Invocation {
    fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    fn channel(&self, name: &'static str) -> Result<ChannelId, CommandError> {
        match self.option(name) {
            Some(OptionValue::Channel(channel)) => Ok(*channel),
            _ => Err(CommandError::MissingOption(name)),
        }
    }

    fn user(&self, name: &'static str) -> Result<UserId, CommandError> {
        match self.option(name) {
            Some(OptionValue::User(user)) => Ok(*user),
            _ => Err(CommandError::MissingOption(name)),
        }
    }

    fn string(&self, name: &'static str) -> Result<&str, CommandError> {
        match self.option(name) {
            Some(OptionValue::String(value)) => Ok(value),
            _ => Err(CommandError::MissingOption(name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Record { channel: ChannelId, tags: String },
    Remove { channel: ChannelId },
    List,
    Refresh,
    AdminAdd { user: UserId },
    AdminRemove { user: UserId },
    AdminList,
}

impl Command {
    pub fn parse(invocation: &Invocation) -> Result<Self, CommandError> {
        let command = match (invocation.name.as_str(), invocation.subcommand.as_deref()) {
            ("record", None) => Command::Record {
                channel: invocation.channel("channel")?,
                tags: invocation.string("tags")?.to_string(),
            },
            ("remove", None) => Command::Remove {
                channel: invocation.channel("channel")?,
            },
            ("list", None) => Command::List,
            ("refresh", None) => Command::Refresh,
            ("admin", Some("add")) => Command::AdminAdd {
                user: invocation.user("user")?,
            },
            ("admin", Some("remove")) => Command::AdminRemove {
                user: invocation.user("user")?,
            },
            ("admin", Some("list")) => Command::AdminList,
            (name, Some(sub)) => {
                return Err(CommandError::UnknownCommand(format!("{} {}", name, sub)))
            }
            (name, None) => return Err(CommandError::UnknownCommand(name.to_string())),
        };
        Ok(command)
    }

    /// Read-only commands are open to everyone in the guild.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Command::List | Command::AdminList)
    }
}

/// Who ran a command, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub guild: GuildId,
    pub user: UserId,
}

pub(crate) fn authorize(guild: &Guild, user: UserId) -> Result<(), CommandError> {
    if guild.is_authorized(user) {
        Ok(())
    } else {
        Err(CommandError::Unauthorized)
    }
}

pub async fn dispatch(state: &BotState, caller: Caller, command: Command) -> CommandResult {
    match command {
        Command::Record { channel, tags } => {
            subscriptions::record(state, caller, channel, &tags).await
        }
        Command::Remove { channel } => subscriptions::remove(state, caller, channel).await,
        Command::List => subscriptions::list(state, caller).await,
        Command::Refresh => subscriptions::refresh(state, caller).await,
        Command::AdminAdd { user } => admin::add(state, caller, user).await,
        Command::AdminRemove { user } => admin::remove(state, caller, user).await,
        Command::AdminList => admin::list(state, caller).await,
    }
}
