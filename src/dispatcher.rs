//! Top-level error routing: command errors become replies, internal errors
//! go to the error tracker, permission problems go to the alert channel.

use std::fmt::Display;

use tracing::{error, warn};

use crate::alerts::send_alert;
use crate::cog::{BotContext, Context};
use crate::cogs::help::send_help;
use crate::error::{BotError, CommandError};
use crate::settings::get_prefix;
use crate::types::{CreateMessage, Embed, User};

pub const INTERNAL_ERROR: &str = "An internal error occurred.";
pub const ERROR_COLOR: u32 = 0xCF0606;

/// Plain-text error line.
pub fn make_error(message: impl Display) -> String {
    format!(":x: Error: {}", message)
}

/// Error embed, addressed to `user` when given.
pub fn error_embed(message: impl Display, user: Option<&User>) -> Embed {
    let description = match user {
        Some(user) => format!("{} {}", user.mention(), message),
        None => message.to_string(),
    };
    Embed::new()
        .title("Error")
        .color(ERROR_COLOR)
        .description(description)
}

// ---------------------------------------------------------------------------
// Error tracking
// ---------------------------------------------------------------------------

/// Sink for errors nobody handled.
pub trait ErrorTracker: Send + Sync {
    fn capture(&self, event: &str, error: &(dyn std::error::Error + 'static));
}

/// Reports errors as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracker;

impl ErrorTracker for LogTracker {
    fn capture(&self, event: &str, err: &(dyn std::error::Error + 'static)) {
        let causes: Vec<String> = std::iter::successors(err.source(), |e| e.source())
            .map(ToString::to_string)
            .collect();
        error!(
            event,
            error = %err,
            causes = ?causes,
            at = %chrono::Utc::now().to_rfc3339(),
            "unhandled error"
        );
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Answer a failed command. Internal failures are handed back so the caller
/// can report them through [`on_error`].
pub async fn on_command_error(
    bot: &BotContext,
    ctx: &Context,
    err: CommandError,
) -> Result<(), BotError> {
    let reply = match err {
        CommandError::Invoke(original) => {
            if !original.is_permission_error() {
                ctx.reply(bot, CreateMessage::new().embed(error_embed(INTERNAL_ERROR, None)))
                    .await?;
            }
            return Err(original);
        }
        CommandError::NotFound(_)
            if ctx.guild_id().is_some() && ctx.prefix == get_prefix(&bot.settings) =>
        {
            return Ok(());
        }
        e if e.is_user_input() => {
            return send_help(bot, ctx, Some(&ctx.command)).await;
        }
        CommandError::User { message, user } => error_embed(message, user.as_ref()),
        other => error_embed(other, None),
    };
    ctx.reply(bot, CreateMessage::new().embed(reply)).await?;
    Ok(())
}

/// The bot is missing a permission in `guild_id`; tell the server team.
pub async fn on_permission_error(
    bot: &BotContext,
    guild_id: &str,
    message: &str,
) -> Result<(), BotError> {
    warn!(guild_id, message, "missing permissions");
    send_alert(&*bot.api, &bot.settings, &make_error(message)).await?;
    Ok(())
}

/// Last stop for an error raised by an event handler.
pub async fn on_error(bot: &BotContext, event: &str, guild_id: Option<&str>, err: &BotError) {
    bot.tracker.capture(event, err);
    if let (true, Some(guild_id)) = (err.is_permission_error(), guild_id) {
        if let Err(e) = on_permission_error(bot, guild_id, &err.to_string()).await {
            warn!(error = %e, "failed to send permission alert");
        }
    }
}
