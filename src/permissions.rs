//! Permission levels and the role check behind them.

use std::fmt;

use crate::config::BotConfig;
use crate::types::Snowflake;

/// Ordered permission levels; a higher level implies every lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionLevel {
    Public,
    Supporter,
    Moderator,
    Admin,
    Owner,
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionLevel::Public => "Public",
            PermissionLevel::Supporter => "Supporter",
            PermissionLevel::Moderator => "Moderator",
            PermissionLevel::Admin => "Admin",
            PermissionLevel::Owner => "Owner",
        };
        f.write_str(name)
    }
}

/// The bits of a member needed to work out their level.
#[derive(Debug, Clone, Copy)]
pub struct MemberRef<'a> {
    pub user_id: &'a str,
    pub roles: &'a [Snowflake],
}

impl PermissionLevel {
    /// The highest level `member` holds.
    pub fn of(member: MemberRef<'_>, config: &BotConfig) -> PermissionLevel {
        if config.owner_id.as_deref() == Some(member.user_id) {
            return PermissionLevel::Owner;
        }
        let has_any = |ids: &[Snowflake]| member.roles.iter().any(|r| ids.contains(r));
        if has_any(&config.roles.admin) {
            PermissionLevel::Admin
        } else if has_any(&config.roles.moderator) {
            PermissionLevel::Moderator
        } else if has_any(&config.roles.supporter) {
            PermissionLevel::Supporter
        } else {
            PermissionLevel::Public
        }
    }

    pub fn check_permissions(self, member: MemberRef<'_>, config: &BotConfig) -> bool {
        PermissionLevel::of(member, config) >= self
    }
}

/// Whether `member` belongs to the server team (supporter or above).
pub fn is_teamler(member: MemberRef<'_>, config: &BotConfig) -> bool {
    PermissionLevel::Supporter.check_permissions(member, config)
}
