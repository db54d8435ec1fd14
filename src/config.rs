//! Bot configuration, read from the environment (and `.env`).

use crate::error::ConfigError;
use crate::types::Snowflake;

pub const DEFAULT_PREFIX: &str = ".";

/// Everything the bot needs to know at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot token from the Discord developer portal.
    pub token: String,
    /// User allowed to run owner-level commands.
    pub owner_id: Option<Snowflake>,
    /// Command prefix used until someone changes it with `prefix`.
    pub default_prefix: String,
    /// Channel that receives setting changes.
    pub logging_changelog: Option<Snowflake>,
    /// Channel that receives permission alerts.
    pub logging_alert: Option<Snowflake>,
    pub roles: PermissionRoles,
}

/// Role ids granting each permission level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionRoles {
    pub supporter: Vec<Snowflake>,
    pub moderator: Vec<Snowflake>,
    pub admin: Vec<Snowflake>,
}

impl BotConfig {
    /// Load configuration from environment variables, after reading `.env`
    /// if present.
    #[cfg(feature = "io")]
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let owner_id = optional_id(&lookup, "OWNER_ID")?;
        let logging_changelog = optional_id(&lookup, "LOGGING_CHANGELOG")?;
        let logging_alert = optional_id(&lookup, "LOGGING_ALERT")?;

        let default_prefix = lookup("DEFAULT_PREFIX")
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());

        let roles = PermissionRoles {
            supporter: parse_id_list(&lookup("SUPPORTER_ROLES").unwrap_or_default()),
            moderator: parse_id_list(&lookup("MODERATOR_ROLES").unwrap_or_default()),
            admin: parse_id_list(&lookup("ADMIN_ROLES").unwrap_or_default()),
        };

        Ok(BotConfig {
            token,
            owner_id,
            default_prefix,
            logging_changelog,
            logging_alert,
            roles,
        })
    }
}

fn optional_id(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<Snowflake>, ConfigError> {
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.parse::<u64>().is_ok() => Ok(Some(v)),
        Some(v) => Err(ConfigError::Invalid { key, value: v }),
    }
}

fn parse_id_list(s: &str) -> Vec<Snowflake> {
    s.split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .filter(|x| x.parse::<u64>().is_ok())
        .map(str::to_string)
        .collect()
}
