//! MorpheusHelper: a Discord bot whose `Messages` cog composes a message
//! through a reaction-driven dialog and posts it to another channel.
//!
//! Transport lives in [`gateway`] (WebSocket) and [`http`] (REST), both
//! behind the `io` feature. Everything above [`api::DiscordApi`] is plain
//! async logic and is tested against an in-memory fake.

pub mod alerts;
pub mod api;
pub mod bot;
pub mod cog;
pub mod cogs;
pub mod config;
pub mod content;
pub mod dispatcher;
pub mod error;
pub mod events;
#[cfg(feature = "io")]
pub mod gateway;
#[cfg(feature = "io")]
pub mod http;
pub mod permissions;
pub mod reactions;
pub mod reader;
pub mod settings;
pub mod types;

#[cfg(test)]
mod testing;

pub use bot::Bot;
pub use cog::{BotContext, Cog};
pub use config::BotConfig;
pub use error::{BotError, CommandError, HttpError};

#[cfg(feature = "io")]
pub use bot::run;
