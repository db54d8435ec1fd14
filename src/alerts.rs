//! Posting to the changelog and alert channels.

use tracing::{debug, warn};

use crate::api::{DiscordApi, DiscordApiExt};
use crate::error::HttpError;
use crate::settings::{Settings, LOGGING_ALERT, LOGGING_CHANGELOG};

async fn send_to_setting<A: DiscordApi + ?Sized>(
    api: &A,
    settings: &Settings,
    key: &str,
    message: &str,
) -> Result<(), HttpError> {
    let Some(channel_id) = settings.channel(key) else {
        debug!(key, "logging channel not configured, dropping message");
        return Ok(());
    };
    match api.send_text(&channel_id, message).await {
        Ok(_) => Ok(()),
        // A channel that no longer exists behaves like an unset one.
        Err(e) if e.is_not_found() => {
            warn!(key, channel_id = %channel_id, "logging channel not found");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Record a configuration change in the changelog channel, if one is set.
pub async fn send_to_changelog<A: DiscordApi + ?Sized>(
    api: &A,
    settings: &Settings,
    message: &str,
) -> Result<(), HttpError> {
    send_to_setting(api, settings, LOGGING_CHANGELOG, message).await
}

/// Warn the server team, e.g. about a permission the bot is missing.
pub async fn send_alert<A: DiscordApi + ?Sized>(
    api: &A,
    settings: &Settings,
    message: &str,
) -> Result<(), HttpError> {
    send_to_setting(api, settings, LOGGING_ALERT, message).await
}
