//! Core bot infrastructure: cog registry, event dispatch and the async
//! event loop.
//!
//! [`Bot`] owns the registered cogs and the shared [`BotContext`]. Each
//! gateway event is routed to the cogs in registration order; message and
//! reaction events run in their own task so a handler waiting for a reply
//! never stalls event delivery.

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::cog::{BotContext, Cog, CommandInfo, Context, EventFlow};
use crate::dispatcher::{on_command_error, on_error};
use crate::error::CommandError;
use crate::events::GatewayEvent;
use crate::types::*;

pub struct Bot {
    ctx: BotContext,
    cogs: Vec<Arc<dyn Cog>>,
}

impl Bot {
    pub fn new(ctx: BotContext) -> Self {
        Self {
            ctx,
            cogs: Vec::new(),
        }
    }

    /// A bot with every built-in cog registered.
    pub fn with_default_cogs(ctx: BotContext) -> Self {
        let mut bot = Self::new(ctx);
        for cog in crate::cogs::default_cogs() {
            bot.register(cog);
        }
        bot
    }

    pub fn register(&mut self, cog: Arc<dyn Cog>) {
        debug!(cog = cog.name(), commands = cog.commands().len(), "registering cog");
        self.ctx.add_commands(cog.commands());
        self.cogs.push(cog);
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    pub fn cog_names(&self) -> Vec<&'static str> {
        self.cogs.iter().map(|c| c.name()).collect()
    }

    /// Route one gateway event to the cogs.
    pub async fn handle_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready(ready) => self.handle_ready(ready).await,
            GatewayEvent::MessageCreate(message) => self.handle_message(message).await,
            GatewayEvent::MessageReactionAdd(reaction) => self.handle_reaction(reaction).await,
            GatewayEvent::MessageDelete(deleted) => self.handle_message_delete(deleted).await,
            GatewayEvent::GuildCreate(guild) => {
                debug!(guild_id = %guild.id, "guild available");
            }
            other => {
                trace!(event = ?other.name(), "unhandled gateway event");
            }
        }
    }

    pub async fn handle_ready(&self, ready: ReadyEvent) {
        info!(user = %ready.user.tag(), guilds = ready.guilds.len(), "logged in");
        self.ctx.set_bot_user(ready.user);
        for cog in &self.cogs {
            if let Err(e) = cog.on_ready(&self.ctx).await {
                on_error(&self.ctx, "on_ready", None, &e).await;
            }
        }
    }

    /// Feed a pending reader, or run the command the message invokes.
    pub async fn handle_message(&self, message: Message) {
        if message.author.bot {
            return;
        }
        if self.ctx.waiters.offer(&message) {
            return;
        }
        let prefixes = self.ctx.prefixes_for(&message);
        let Some(ctx) = Context::parse(message, &prefixes) else {
            return;
        };

        let Err(err) = self.invoke(&ctx).await else {
            return;
        };
        if let Err(e) = on_command_error(&self.ctx, &ctx, err).await {
            on_error(&self.ctx, "on_message", ctx.guild_id(), &e).await;
        }
    }

    async fn invoke(&self, ctx: &Context) -> Result<(), CommandError> {
        let (cog, command) = self
            .find_command(&ctx.command)
            .ok_or_else(|| CommandError::NotFound(ctx.command.clone()))?;
        if command.guild_only && ctx.guild_id().is_none() {
            return Err(CommandError::NoPrivateMessage);
        }
        if !command.level.check_permissions(ctx.member(), &self.ctx.config) {
            return Err(CommandError::MissingPermission(command.level));
        }
        info!(
            command = command.name,
            user = %ctx.author().tag(),
            channel_id = %ctx.channel_id(),
            "running command"
        );
        cog.on_command(&self.ctx, ctx).await
    }

    fn find_command(&self, name: &str) -> Option<(&Arc<dyn Cog>, CommandInfo)> {
        self.cogs.iter().find_map(|cog| {
            cog.commands()
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .map(|c| (cog, *c))
        })
    }

    /// Offer a reaction to each cog until one claims it.
    pub async fn handle_reaction(&self, event: ReactionAdd) {
        for cog in &self.cogs {
            match cog.on_raw_reaction_add(&self.ctx, &event).await {
                Ok(EventFlow::Continue) => {}
                Ok(EventFlow::Stop) => break,
                Err(e) => {
                    on_error(&self.ctx, "on_raw_reaction_add", event.guild_id.as_deref(), &e)
                        .await;
                    break;
                }
            }
        }
    }

    pub async fn handle_message_delete(&self, event: MessageDelete) {
        for cog in &self.cogs {
            if let Err(e) = cog.on_message_delete(&self.ctx, &event).await {
                on_error(&self.ctx, "on_message_delete", event.guild_id.as_deref(), &e).await;
            }
        }
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("ctx", &self.ctx)
            .field("cogs", &self.cog_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Bot entry point
// ---------------------------------------------------------------------------

/// Connect to Discord and handle events until the gateway stops.
#[cfg(feature = "io")]
pub async fn run(config: crate::config::BotConfig) -> Result<(), crate::error::BotError> {
    use tracing::{error, warn};

    use crate::api::SharedApi;
    use crate::dispatcher::LogTracker;
    use crate::gateway::{self, GatewayConfig, GatewayError};
    use crate::http::DiscordHttpClient;

    let api: SharedApi = Arc::new(DiscordHttpClient::new(&config.token));
    let gw = gateway::connect(GatewayConfig::new(config.token.clone()));
    let ctx = BotContext::new(api, config, Arc::new(LogTracker));
    let bot = Arc::new(Bot::with_default_cogs(ctx));
    info!(cogs = ?bot.cog_names(), "gateway started, entering event loop");

    while let Ok(event) = gw.events.recv().await {
        match event {
            GatewayEvent::MessageCreate(_)
            | GatewayEvent::MessageReactionAdd(_)
            | GatewayEvent::MessageDelete(_) => {
                let bot = Arc::clone(&bot);
                tokio::spawn(async move { bot.handle_event(event).await });
            }
            other => bot.handle_event(other).await,
        }
    }

    warn!("event stream ended, bot shutting down");
    match gw.driver.await {
        Ok(result) => Ok(result?),
        Err(e) => {
            error!(error = %e, "gateway driver task failed");
            Err(GatewayError::Driver(e.to_string()).into())
        }
    }
}
