//! Built-in cogs.

pub mod help;
pub mod messages;
pub mod settings;

use std::sync::Arc;

use crate::cog::Cog;

pub use help::HelpCog;
pub use messages::MessagesCog;
pub use settings::SettingsCog;

/// Every cog the bot ships with, in registration order.
pub fn default_cogs() -> Vec<Arc<dyn Cog>> {
    vec![
        Arc::new(SettingsCog),
        Arc::new(HelpCog),
        Arc::new(MessagesCog::new()),
    ]
}
