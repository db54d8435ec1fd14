//! `prefix`: show or change the command prefix.

use async_trait::async_trait;
use tracing::info;

use crate::alerts::send_to_changelog;
use crate::cog::{BotContext, Cog, CommandInfo, Context};
use crate::error::{BotError, CommandError};
use crate::permissions::PermissionLevel;
use crate::settings::{get_prefix, set_prefix};
use crate::types::{CreateMessage, Embed};

pub const SETTINGS_COLOR: u32 = 0x03AD28;
pub const MAX_PREFIX_LEN: usize = 16;

const COMMANDS: &[CommandInfo] = &[CommandInfo {
    name: "prefix",
    usage: "[new prefix]",
    description: "Show the command prefix. Admins can change it.",
    level: PermissionLevel::Public,
    guild_only: true,
}];

/// Printable ASCII except the backtick, which would break code spans.
pub fn validate_prefix(prefix: &str) -> Result<(), CommandError> {
    if prefix.is_empty() || prefix.chars().count() > MAX_PREFIX_LEN {
        return Err(CommandError::user(format!(
            "Prefix must be between 1 and {} characters long.",
            MAX_PREFIX_LEN
        )));
    }
    if !prefix
        .chars()
        .all(|c| (c.is_ascii_alphanumeric() || c.is_ascii_punctuation()) && c != '`')
    {
        return Err(CommandError::user(
            "Prefix may only contain letters, digits and punctuation.",
        ));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct SettingsCog;

impl SettingsCog {
    async fn change_prefix(
        &self,
        bot: &BotContext,
        ctx: &Context,
        new_prefix: &str,
    ) -> Result<(), CommandError> {
        if !PermissionLevel::Admin.check_permissions(ctx.member(), &bot.config) {
            return Err(CommandError::MissingPermission(PermissionLevel::Admin));
        }
        validate_prefix(new_prefix)?;

        set_prefix(&bot.settings, new_prefix);
        info!(prefix = new_prefix, user = %ctx.author().tag(), "prefix updated");
        let embed = Embed::new()
            .title("Settings")
            .color(SETTINGS_COLOR)
            .description("Prefix has been updated.");
        ctx.reply(bot, CreateMessage::new().embed(embed)).await?;
        send_to_changelog(
            &*bot.api,
            &bot.settings,
            &format!("Bot prefix has been changed to `{}`", new_prefix),
        )
        .await
        .map_err(BotError::from)?;
        Ok(())
    }
}

#[async_trait]
impl Cog for SettingsCog {
    fn name(&self) -> &'static str {
        "Settings"
    }

    fn commands(&self) -> &'static [CommandInfo] {
        COMMANDS
    }

    async fn on_command(&self, bot: &BotContext, ctx: &Context) -> Result<(), CommandError> {
        match ctx.arg(0) {
            Some(new_prefix) => self.change_prefix(bot, ctx, new_prefix).await,
            None => {
                let embed = Embed::new()
                    .title("Settings")
                    .color(SETTINGS_COLOR)
                    .description(format!("Current prefix: `{}`", get_prefix(&bot.settings)));
                ctx.reply(bot, CreateMessage::new().embed(embed)).await?;
                Ok(())
            }
        }
    }
}
