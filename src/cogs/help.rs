//! `help`: list the commands a member may use, or explain one of them.

use async_trait::async_trait;

use crate::cog::{BotContext, Cog, CommandInfo, Context};
use crate::error::{BotError, CommandError};
use crate::permissions::{is_teamler, PermissionLevel};
use crate::types::{CreateMessage, Embed};

pub const HELP_COLOR: u32 = 0x03AD28;

const COMMANDS: &[CommandInfo] = &[CommandInfo {
    name: "help",
    usage: "[command]",
    description: "Show all commands, or how to use one of them.",
    level: PermissionLevel::Public,
    guild_only: false,
}];

/// `{prefix}{name} {usage}`
pub fn format_usage(prefix: &str, command: &CommandInfo) -> String {
    if command.usage.is_empty() {
        format!("{}{}", prefix, command.name)
    } else {
        format!("{}{} {}", prefix, command.name, command.usage)
    }
}

pub fn command_help_embed(prefix: &str, command: &CommandInfo) -> Embed {
    let mut embed = Embed::new()
        .title("Help")
        .color(HELP_COLOR)
        .description(format!("`{}`\n{}", format_usage(prefix, command), command.description));
    if command.level > PermissionLevel::Public {
        embed = embed.footer(format!("Requires {} permissions", command.level));
    }
    embed
}

pub fn command_list_embed(prefix: &str, commands: &[CommandInfo]) -> Embed {
    let lines: Vec<String> = commands
        .iter()
        .map(|c| format!("`{}` {}", format_usage(prefix, c), c.description))
        .collect();
    Embed::new()
        .title("Help")
        .color(HELP_COLOR)
        .description(lines.join("\n"))
}

/// Commands `ctx`'s author may run. Restricted ones are only listed for
/// team members.
pub fn visible_commands(bot: &BotContext, ctx: &Context) -> Vec<CommandInfo> {
    let member = ctx.member();
    let teamler = is_teamler(member, &bot.config);
    bot.commands()
        .into_iter()
        .filter(|c| c.level == PermissionLevel::Public || teamler)
        .filter(|c| c.level.check_permissions(member, &bot.config))
        .filter(|c| !c.guild_only || ctx.guild_id().is_some())
        .collect()
}

/// Reply with help for `command`, or with the command list when it is
/// `None` or unknown.
pub async fn send_help(
    bot: &BotContext,
    ctx: &Context,
    command: Option<&str>,
) -> Result<(), BotError> {
    let embed = match command.and_then(|name| bot.command(name)) {
        Some(info) => command_help_embed(&ctx.prefix, &info),
        None => command_list_embed(&ctx.prefix, &visible_commands(bot, ctx)),
    };
    ctx.reply(bot, CreateMessage::new().embed(embed)).await?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct HelpCog;

#[async_trait]
impl Cog for HelpCog {
    fn name(&self) -> &'static str {
        "Help"
    }

    fn commands(&self) -> &'static [CommandInfo] {
        COMMANDS
    }

    async fn on_command(&self, bot: &BotContext, ctx: &Context) -> Result<(), CommandError> {
        match ctx.arg(0) {
            Some(name) if bot.command(name).is_none() => Err(CommandError::user(format!(
                "Command \"{}\" is not found",
                name
            ))),
            name => Ok(send_help(bot, ctx, name).await?),
        }
    }
}
