//! Error types shared across the crate.
//!
//! Transport failures surface as [`HttpError`]; anything a handler can fail
//! with is a [`BotError`]; failures while running a prefix command are a
//! [`CommandError`], whose variant decides how the dispatcher answers the
//! user.

use thiserror::Error;

use crate::permissions::PermissionLevel;
use crate::types::User;

/// Failure talking to the Discord REST API.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Non-success status from Discord.
    #[error("Discord API error {status} on {route}: {body}")]
    Api {
        status: u16,
        body: String,
        route: String,
    },
    /// Transport / network error.
    #[error("HTTP transport error: {0}")]
    Transport(String),
    /// Serialisation error.
    #[error("Serialisation error: {0}")]
    Serde(String),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Missing access or missing permissions.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

/// Invalid or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Anything an event handler or cog can fail with.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[cfg(feature = "io")]
    #[error(transparent)]
    Gateway(#[from] crate::gateway::GatewayError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pending message read was cancelled before a reply arrived.
    #[error("wait for message was cancelled")]
    Cancelled,
}

impl BotError {
    /// The bot lacked a permission for a REST call.
    pub fn is_permission_error(&self) -> bool {
        matches!(self, BotError::Http(e) if e.is_forbidden())
    }
}

/// Failure while resolving, checking or running a prefix command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command \"{0}\" is not found")]
    NotFound(String),

    #[error("{0} is a required argument that is missing.")]
    MissingArgument(&'static str),

    #[error("{0}")]
    BadArgument(String),

    #[error("This command cannot be used in private messages.")]
    NoPrivateMessage,

    #[error("You need {0} permissions to use this command.")]
    MissingPermission(PermissionLevel),

    /// An error meant to be shown to the user verbatim, optionally
    /// addressed to someone.
    #[error("{message}")]
    User {
        message: String,
        user: Option<User>,
    },

    /// The command itself failed.
    #[error("Command raised an exception: {0}")]
    Invoke(#[from] BotError),
}

impl CommandError {
    pub fn user(message: impl Into<String>) -> Self {
        CommandError::User {
            message: message.into(),
            user: None,
        }
    }

    /// Errors caused by what the user typed, answered with command help.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            CommandError::MissingArgument(_) | CommandError::BadArgument(_)
        )
    }
}
