//! Key-value settings store and prefix resolution.
//!
//! Values are kept as strings and parsed on read, so callers pick the type
//! at the call site the same way they pick the default.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::config::BotConfig;

pub const PREFIX: &str = "prefix";
pub const LOGGING_CHANGELOG: &str = "logging_changelog";
pub const LOGGING_ALERT: &str = "logging_alert";

/// In-memory settings shared by every handler. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with the values configured at startup.
    pub fn from_config(config: &BotConfig) -> Self {
        let settings = Self::new();
        settings.set(PREFIX, &config.default_prefix);
        if let Some(id) = &config.logging_changelog {
            settings.set(LOGGING_CHANGELOG, id);
        }
        if let Some(id) = &config.logging_alert {
            settings.set(LOGGING_ALERT, id);
        }
        settings
    }

    /// Read `key` as `T`, falling back to `default` when it is unset or
    /// does not parse.
    pub fn get<T: FromStr>(&self, key: &str, default: T) -> T {
        let values = match self.values.read() {
            Ok(v) => v,
            Err(poisoned) => poisoned.into_inner(),
        };
        values
            .get(key)
            .and_then(|v| v.parse::<T>().ok())
            .unwrap_or(default)
    }

    pub fn set<T: ToString + ?Sized>(&self, key: &str, value: &T) {
        let value = value.to_string();
        debug!(key, value = %value, "setting updated");
        let mut values = match self.values.write() {
            Ok(v) => v,
            Err(poisoned) => poisoned.into_inner(),
        };
        values.insert(key.to_string(), value);
    }

    /// A channel id stored under `key`; `-1` or unset means "none".
    pub fn channel(&self, key: &str) -> Option<String> {
        let id = self.get::<i64>(key, -1);
        (id > 0).then(|| id.to_string())
    }
}

pub fn get_prefix(settings: &Settings) -> String {
    settings.get(PREFIX, ".".to_string())
}

pub fn set_prefix(settings: &Settings, new_prefix: &str) {
    settings.set(PREFIX, new_prefix);
}

/// Every prefix a command may start with, in match order.
///
/// Mentioning the bot always works; in DMs no prefix is needed at all.
pub fn fetch_prefix(settings: &Settings, bot_user_id: Option<&str>, in_guild: bool) -> Vec<String> {
    let mut prefixes = vec![get_prefix(settings)];
    if let Some(id) = bot_user_id {
        prefixes.push(format!("<@!{}> ", id));
        prefixes.push(format!("<@{}> ", id));
    }
    if !in_guild {
        prefixes.push(String::new());
    }
    prefixes
}
