//! Feature modules ("cogs") and the state they share.
//!
//! A cog declares the prefix commands it owns and overrides whichever event
//! hooks it cares about. The [`crate::bot::Bot`] forwards events to every
//! registered cog in registration order.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::api::{DiscordApi, SharedApi};
use crate::config::BotConfig;
use crate::dispatcher::ErrorTracker;
use crate::error::{BotError, CommandError};
use crate::permissions::{MemberRef, PermissionLevel};
use crate::reader::MessageWaiters;
use crate::settings::{fetch_prefix, Settings};
use crate::types::*;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Static description of a prefix command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: &'static str,
    /// Arguments as shown in help, e.g. `<channel>`.
    pub usage: &'static str,
    pub description: &'static str,
    pub level: PermissionLevel,
    pub guild_only: bool,
}

/// Whether later cogs should still see a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFlow {
    Continue,
    Stop,
}

/// A message that starts with one of the bot's prefixes.
#[derive(Debug, Clone)]
pub struct Context {
    pub message: Message,
    /// The prefix the message matched.
    pub prefix: String,
    /// Command name, lowercased.
    pub command: String,
    pub args: Vec<String>,
}

impl Context {
    /// Split `message` into prefix, command and arguments. The first prefix
    /// the content starts with wins.
    pub fn parse(message: Message, prefixes: &[String]) -> Option<Context> {
        let prefix = prefixes
            .iter()
            .find(|p| message.content.starts_with(p.as_str()))?
            .clone();
        let mut words = message.content[prefix.len()..].split_whitespace();
        let command = words.next()?.to_lowercase();
        let args = words.map(str::to_string).collect();
        Some(Context {
            message,
            prefix,
            command,
            args,
        })
    }

    pub fn author(&self) -> &User {
        &self.message.author
    }

    pub fn channel_id(&self) -> &str {
        &self.message.channel_id
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.message.guild_id.as_deref()
    }

    pub fn member(&self) -> MemberRef<'_> {
        MemberRef {
            user_id: &self.message.author.id,
            roles: self
                .message
                .member
                .as_ref()
                .map_or(&[][..], |m| m.roles.as_slice()),
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Reply to the invoking message.
    pub async fn reply(&self, bot: &BotContext, msg: CreateMessage) -> Result<Message, BotError> {
        Ok(bot
            .api
            .create_message(self.channel_id(), &msg.reply_to(&self.message.id))
            .await?)
    }
}

/// Parse a `<#id>` mention or a bare id into a channel id.
pub fn parse_channel_arg(arg: &str) -> Option<&str> {
    let id = arg
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(arg);
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a cog may touch. Cheap to clone.
#[derive(Clone)]
pub struct BotContext {
    pub api: SharedApi,
    pub settings: Settings,
    pub waiters: MessageWaiters,
    pub config: Arc<BotConfig>,
    pub tracker: Arc<dyn ErrorTracker>,
    bot_user: Arc<RwLock<Option<User>>>,
    commands: Arc<RwLock<Vec<CommandInfo>>>,
}

impl BotContext {
    pub fn new(api: SharedApi, config: BotConfig, tracker: Arc<dyn ErrorTracker>) -> Self {
        Self {
            api,
            settings: Settings::from_config(&config),
            waiters: MessageWaiters::new(),
            config: Arc::new(config),
            tracker,
            bot_user: Arc::default(),
            commands: Arc::default(),
        }
    }

    /// The bot's own user, known once READY has been received.
    pub fn bot_user(&self) -> Option<User> {
        match self.bot_user.read() {
            Ok(user) => user.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn bot_user_id(&self) -> Option<String> {
        self.bot_user().map(|u| u.id)
    }

    pub fn set_bot_user(&self, user: User) {
        match self.bot_user.write() {
            Ok(mut slot) => *slot = Some(user),
            Err(poisoned) => *poisoned.into_inner() = Some(user),
        }
    }

    pub(crate) fn add_commands(&self, commands: &[CommandInfo]) {
        match self.commands.write() {
            Ok(mut all) => all.extend_from_slice(commands),
            Err(poisoned) => poisoned.into_inner().extend_from_slice(commands),
        }
    }

    /// Every registered command, in registration order.
    pub fn commands(&self) -> Vec<CommandInfo> {
        match self.commands.read() {
            Ok(all) => all.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn command(&self, name: &str) -> Option<CommandInfo> {
        self.commands()
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Prefixes valid for `message`.
    pub fn prefixes_for(&self, message: &Message) -> Vec<String> {
        fetch_prefix(
            &self.settings,
            self.bot_user_id().as_deref(),
            message.guild_id.is_some(),
        )
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("settings", &self.settings)
            .field("waiters", &self.waiters)
            .field("bot_user", &self.bot_user_id())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Cog trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Cog: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prefix commands handled by [`Cog::on_command`].
    fn commands(&self) -> &'static [CommandInfo] {
        &[]
    }

    async fn on_ready(&self, _bot: &BotContext) -> Result<(), BotError> {
        Ok(())
    }

    /// Run one of this cog's commands. Permission and guild checks have
    /// already passed.
    async fn on_command(&self, _bot: &BotContext, ctx: &Context) -> Result<(), CommandError> {
        Err(CommandError::NotFound(ctx.command.clone()))
    }

    async fn on_raw_reaction_add(
        &self,
        _bot: &BotContext,
        _event: &ReactionAdd,
    ) -> Result<EventFlow, BotError> {
        Ok(EventFlow::Continue)
    }

    async fn on_message_delete(
        &self,
        _bot: &BotContext,
        _event: &MessageDelete,
    ) -> Result<(), BotError> {
        Ok(())
    }
}
