//! Discord side of the bot: gateway events, slash command registration and
//! outbound messages.

use async_trait::async_trait;
use serenity::all::{
    Command as SlashCommand, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EventHandler, Guild as DiscordGuild, Http, Interaction,
    Ready, ResolvedOption, ResolvedValue, UnavailableGuild,
};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use accord_core::{ChannelId, GuildId, UserId};
use accord_worker::{Transport, TransportError};

use crate::commands::{dispatch, Caller, Command, Invocation, OptionValue};
use crate::error::CommandError;
use crate::guilds;
use crate::state::BotState;

pub fn create_commands() -> Vec<CreateCommand> {
    let channel = |description: &str| {
        CreateCommandOption::new(CommandOptionType::Channel, "channel", description).required(true)
    };
    let user = |description: &str| {
        CreateCommandOption::new(CommandOptionType::User, "user", description).required(true)
    };

    vec![
        CreateCommand::new("record")
            .description("Post new items matching some tags to a channel")
            .dm_permission(false)
            .add_option(channel("Channel to post in"))
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "tags",
                    "Space separated tags, at most 11",
                )
                .required(true),
            ),
        CreateCommand::new("remove")
            .description("Stop posting to a channel")
            .dm_permission(false)
            .add_option(channel("Channel to stop posting in")),
        CreateCommand::new("list")
            .description("List recorded channels")
            .dm_permission(false),
        CreateCommand::new("refresh")
            .description("Check every recorded channel for new items now")
            .dm_permission(false),
        CreateCommand::new("admin")
            .description("Manage who can change recorded channels")
            .dm_permission(false)
            .add_option(
                CreateCommandOption::new(CommandOptionType::SubCommand, "add", "Add an admin")
                    .add_sub_option(user("User to add")),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "remove",
                    "Remove an admin",
                )
                .add_sub_option(user("User to remove")),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "list",
                "List admins",
            )),
    ]
}

/// Install the global commands, or clear them when `install` is false.
pub async fn sync_global_commands(token: &str, install: bool) -> anyhow::Result<()> {
    let http = Http::new(token);
    let application = http.get_current_application_info().await?;
    http.set_application_id(application.id);

    let commands = if install { create_commands() } else { Vec::new() };
    let installed = SlashCommand::set_global_commands(&http, commands).await?;
    info!(commands = installed.len(), install, "global commands updated");
    Ok(())
}

fn option_value(value: &ResolvedValue<'_>) -> Option<OptionValue> {
    match value {
        ResolvedValue::Channel(channel) => Some(OptionValue::Channel(ChannelId(channel.id.get()))),
        ResolvedValue::User(user, _) => Some(OptionValue::User(UserId(user.id.get()))),
        ResolvedValue::String(value) => Some(OptionValue::String(value.to_string())),
        _ => None,
    }
}

fn push_options(invocation: &mut Invocation, options: &[ResolvedOption<'_>]) {
    for option in options {
        match &option.value {
            ResolvedValue::SubCommand(inner) => {
                invocation.subcommand = Some(option.name.to_string());
                push_options(invocation, inner);
            }
            value => match option_value(value) {
                Some(value) => invocation.options.push((option.name.to_string(), value)),
                None => debug!(option = option.name, "ignoring unsupported option"),
            },
        }
    }
}

pub fn invocation(command: &CommandInteraction) -> Invocation {
    let mut invocation = Invocation {
        name: command.data.name.clone(),
        ..Invocation::default()
    };
    push_options(&mut invocation, &command.data.options());
    invocation
}

pub struct Handler {
    state: BotState,
    ready: Arc<Notify>,
}

impl Handler {
    pub fn new(state: BotState, ready: Arc<Notify>) -> Self {
        Self { state, ready }
    }

    async fn run_command(&self, command: &CommandInteraction) -> (String, bool) {
        let Some(guild) = command.guild_id else {
            return (CommandError::NotInGuild.user_message(), true);
        };
        let caller = Caller {
            guild: GuildId(guild.get()),
            user: UserId(command.user.id.get()),
        };

        let parsed = match Command::parse(&invocation(command)) {
            Ok(parsed) => parsed,
            Err(err) => return (err.user_message(), true),
        };
        let read_only = parsed.is_read_only();
        debug!(guild = %caller.guild, user = %caller.user, command = ?parsed, "command received");

        match dispatch(&self.state, caller, parsed).await {
            // Output of read-only commands is shared with the channel.
            Ok(reply) => (reply, !read_only),
            Err(err) => {
                if let CommandError::Store(inner) = &err {
                    error!(guild = %caller.guild, error = %inner, "command could not be stored");
                }
                (err.user_message(), true)
            }
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "connected to discord");

        let current: Vec<GuildId> = ready.guilds.iter().map(|g| GuildId(g.id.get())).collect();
        if let Err(err) = guilds::reconcile(&self.state, &current).await {
            error!(error = %err, "could not reconcile guilds");
        }
        self.ready.notify_one();
    }

    async fn guild_create(&self, _ctx: Context, guild: DiscordGuild, _is_new: Option<bool>) {
        let id = GuildId(guild.id.get());
        let owner = UserId(guild.owner_id.get());
        if let Err(err) = guilds::join(&self.state, id, Some(owner)).await {
            error!(guild = %id, error = %err, "could not record guild");
        }
    }

    async fn guild_delete(
        &self,
        _ctx: Context,
        incomplete: UnavailableGuild,
        _full: Option<DiscordGuild>,
    ) {
        let id = GuildId(incomplete.id.get());
        if incomplete.unavailable {
            warn!(guild = %id, "guild became unavailable");
            return;
        }
        if let Err(err) = guilds::leave(&self.state, id).await {
            error!(guild = %id, error = %err, "could not forget guild");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        let (content, ephemeral) = self.run_command(&command).await;
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(ephemeral),
        );
        if let Err(err) = command.create_response(&ctx.http, response).await {
            error!(command = %command.data.name, error = %err, "could not answer command");
        }
    }
}

/// Sends items through the bot's HTTP client.
#[derive(Clone)]
pub struct DiscordTransport {
    http: Arc<Http>,
}

impl DiscordTransport {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), TransportError> {
        if channel.get() == 0 {
            return Err(TransportError::UnknownChannel(channel));
        }
        serenity::all::ChannelId::new(channel.get())
            .say(&self.http, text)
            .await
            .map_err(|err| TransportError::Send(err.to_string()))?;
        Ok(())
    }
}
