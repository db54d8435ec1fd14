//! Bring a message's reactions in line with a target ordered list.
//!
//! Discord cannot reorder reactions in place, so once the current list
//! diverges from the target every later reaction is removed and re-added.

use tracing::debug;

use crate::api::DiscordApi;
use crate::error::HttpError;

/// Calls needed to turn one reaction list into another, applied in field
/// order: clear everything, then removals, then additions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionPlan {
    pub clear_all: bool,
    pub remove: Vec<String>,
    pub add: Vec<String>,
}

impl ReactionPlan {
    pub fn is_noop(&self) -> bool {
        !self.clear_all && self.remove.is_empty() && self.add.is_empty()
    }
}

/// Compare emoji ignoring the variation selector clients may or may not send.
pub fn same_emoji(a: &str, b: &str) -> bool {
    a.chars()
        .filter(|&c| c != '\u{fe0f}')
        .eq(b.chars().filter(|&c| c != '\u{fe0f}'))
}

fn same_slot(a: Option<&String>, b: Option<&String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_emoji(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Pair up two lists position by position, padding the shorter with `None`.
fn zip_longest<'a, T>(a: &'a [T], b: &'a [T]) -> impl Iterator<Item = (Option<&'a T>, Option<&'a T>)> {
    (0..a.len().max(b.len())).map(move |i| (a.get(i), b.get(i)))
}

pub fn plan_reactions<S: AsRef<str>>(current: &[String], target: &[S]) -> ReactionPlan {
    let target: Vec<String> = target.iter().map(|s| s.as_ref().to_string()).collect();

    // Clearing is a single call, so take it whenever the very first reaction
    // is already wrong. The walk below still queues the (now redundant)
    // removals for those emoji.
    let clear_all =
        !current.is_empty() && (target.is_empty() || !same_slot(current.first(), target.first()));

    let mut plan = ReactionPlan {
        clear_all,
        ..ReactionPlan::default()
    };
    for (old, new) in zip_longest(current, &target) {
        if !same_slot(old, new) || !plan.remove.is_empty() || !plan.add.is_empty() {
            if let Some(old) = old {
                plan.remove.push(old.clone());
            }
            if let Some(new) = new {
                plan.add.push(new.clone());
            }
        }
    }
    plan
}

/// Apply [`plan_reactions`] to a message whose bot reactions are `current`.
pub async fn update_reactions<A, S>(
    api: &A,
    channel_id: &str,
    message_id: &str,
    current: &[String],
    target: &[S],
) -> Result<(), HttpError>
where
    A: DiscordApi + ?Sized,
    S: AsRef<str> + Sync,
{
    let plan = plan_reactions(current, target);
    if plan.is_noop() {
        return Ok(());
    }
    debug!(
        message_id,
        clear_all = plan.clear_all,
        remove = plan.remove.len(),
        add = plan.add.len(),
        "updating reactions"
    );

    if plan.clear_all {
        api.delete_all_reactions(channel_id, message_id).await?;
    }
    for emoji in &plan.remove {
        api.delete_all_reactions_for_emoji(channel_id, message_id, emoji)
            .await?;
    }
    for emoji in &plan.add {
        api.create_reaction(channel_id, message_id, emoji).await?;
    }
    Ok(())
}
