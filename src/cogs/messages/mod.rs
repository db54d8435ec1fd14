//! Compose a message through a reaction-driven dialog and post it to
//! another channel.

pub mod dialog;
pub mod session;

use async_trait::async_trait;
use tracing::debug;

use crate::api::DiscordApi;
use crate::cog::{parse_channel_arg, BotContext, Cog, CommandInfo, Context, EventFlow};
use crate::error::{BotError, CommandError};
use crate::permissions::PermissionLevel;
use crate::types::{MessageDelete, ReactionAdd};
use dialog::{create_message_dialog, handle_embed_menu, handle_main_menu, same_emoji, Outcome};
use session::{Mode, SessionRegistry};

const COMMANDS: &[CommandInfo] = &[CommandInfo {
    name: "test",
    usage: "<channel>",
    description: "Compose a message and send it to a channel.",
    level: PermissionLevel::Owner,
    guild_only: true,
}];

#[derive(Debug, Default)]
pub struct MessagesCog {
    sessions: SessionRegistry,
}

impl MessagesCog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    async fn start_dialog(&self, bot: &BotContext, ctx: &Context) -> Result<(), CommandError> {
        let arg = ctx.arg(0).ok_or(CommandError::MissingArgument("channel"))?;
        let not_found = || CommandError::BadArgument(format!("Channel \"{}\" not found.", arg));
        let channel_id = parse_channel_arg(arg).ok_or_else(not_found)?;
        let guild_id = ctx.guild_id().ok_or(CommandError::NoPrivateMessage)?;

        let target = match bot.api.get_channel(channel_id).await {
            Ok(channel) => channel,
            Err(e) if e.is_not_found() => return Err(not_found()),
            Err(e) => return Err(BotError::from(e).into()),
        };
        if target.guild_id.as_deref() != Some(guild_id) || !target.kind.is_messageable() {
            return Err(not_found());
        }

        let session =
            create_message_dialog(bot, guild_id, ctx.channel_id(), ctx.author(), &target).await?;
        self.sessions.insert(session);
        Ok(())
    }
}

#[async_trait]
impl Cog for MessagesCog {
    fn name(&self) -> &'static str {
        "Messages"
    }

    fn commands(&self) -> &'static [CommandInfo] {
        COMMANDS
    }

    async fn on_command(&self, bot: &BotContext, ctx: &Context) -> Result<(), CommandError> {
        match ctx.command.as_str() {
            "test" => self.start_dialog(bot, ctx).await,
            other => Err(CommandError::NotFound(other.to_string())),
        }
    }

    async fn on_raw_reaction_add(
        &self,
        bot: &BotContext,
        event: &ReactionAdd,
    ) -> Result<EventFlow, BotError> {
        if event.guild_id.is_none()
            || event.is_from_bot()
            || bot.bot_user_id().as_deref() == Some(event.user_id.as_str())
        {
            return Ok(EventFlow::Continue);
        }
        let Some(handle) = self.sessions.get(&event.message_id) else {
            return Ok(EventFlow::Continue);
        };

        let emoji = event.emoji.as_reaction();
        bot.api
            .delete_user_reaction(&event.channel_id, &event.message_id, &emoji, &event.user_id)
            .await?;

        if event.user_id != handle.author_id {
            return Ok(EventFlow::Stop);
        }
        let mut session = match handle.state.try_lock() {
            Ok(session) => session,
            Err(_) if same_emoji(&emoji, dialog::X) => {
                // Cancel must get through a pending prompt: stop it, then
                // wait for the handler holding the session to return.
                debug!(root_id = %event.message_id, "dialog busy, interrupting for cancel");
                handle.interrupt.raise();
                let session = handle.state.lock().await;
                session.interrupt.clear();
                if self.sessions.get(&event.message_id).is_none() {
                    return Ok(EventFlow::Stop);
                }
                session
            }
            Err(_) => {
                debug!(root_id = %event.message_id, emoji, "dialog busy, click dropped");
                return Ok(EventFlow::Stop);
            }
        };

        let outcome = match session.mode {
            Mode::Main => handle_main_menu(bot, &mut session, &emoji).await,
            Mode::EmbedEdit => handle_embed_menu(bot, &mut session, &emoji).await,
        };
        match outcome {
            Ok(Outcome::Closed) => {
                self.sessions.remove(&event.message_id);
            }
            Ok(Outcome::Open) | Err(BotError::Cancelled) => {}
            Err(e) => return Err(e),
        }
        Ok(EventFlow::Stop)
    }

    async fn on_message_delete(
        &self,
        _bot: &BotContext,
        event: &MessageDelete,
    ) -> Result<(), BotError> {
        if let Some(handle) = self.sessions.remove(&event.id) {
            // A prompt of this dialog may still be waiting for a reply.
            handle.interrupt.raise();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
