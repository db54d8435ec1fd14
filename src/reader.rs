//! Waiting for the next message a user sends in a channel.
//!
//! A flow that needs a reply registers a single-shot waiter keyed by
//! (channel, author). The event loop offers every incoming message to the
//! waiters before treating it as a command; the first matching waiter takes
//! it. Dropping a waiter's sender (via [`MessageWaiters::cancel`]) wakes the
//! waiting flow with [`BotError::Cancelled`].

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::debug;

use crate::api::{DiscordApi, DiscordApiExt};
use crate::content::get_files_from_message;
use crate::error::BotError;
use crate::types::{Message, Snowflake, UploadFile};

struct Waiter {
    channel_id: Snowflake,
    author_id: Snowflake,
    tx: oneshot::Sender<Message>,
}

impl Waiter {
    fn matches(&self, channel_id: &str, author_id: &str) -> bool {
        self.channel_id == channel_id && self.author_id == author_id
    }
}

/// Shared list of pending message reads. Cheap to clone.
#[derive(Clone, Default)]
pub struct MessageWaiters {
    waiters: Arc<Mutex<Vec<Waiter>>>,
}

impl std::fmt::Debug for MessageWaiters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWaiters")
            .field("pending", &self.lock().len())
            .finish()
    }
}

impl MessageWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Waiter>> {
        match self.waiters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register interest in the next message from `author_id` in
    /// `channel_id`. Resolves with an error if the waiter is cancelled.
    pub fn wait_for(&self, channel_id: &str, author_id: &str) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.lock();
        // Waiters whose flow has gone away are pruned on every registration.
        waiters.retain(|w| !w.tx.is_closed());
        waiters.push(Waiter {
            channel_id: channel_id.to_string(),
            author_id: author_id.to_string(),
            tx,
        });
        rx
    }

    /// Hand `message` to the oldest matching waiter. Returns `true` if one
    /// took it, in which case the message must not be handled further.
    pub fn offer(&self, message: &Message) -> bool {
        let mut waiters = self.lock();
        while let Some(index) = waiters
            .iter()
            .position(|w| w.matches(&message.channel_id, &message.author.id))
        {
            let waiter = waiters.remove(index);
            if waiter.tx.send(message.clone()).is_ok() {
                debug!(channel_id = %message.channel_id, author = %message.author.id, "message consumed by waiter");
                return true;
            }
        }
        false
    }

    /// Drop every waiter for (`channel_id`, `author_id`), returning how many
    /// were removed.
    pub fn cancel(&self, channel_id: &str, author_id: &str) -> usize {
        let mut waiters = self.lock();
        let before = waiters.len();
        waiters.retain(|w| !w.matches(channel_id, author_id));
        before - waiters.len()
    }

    pub fn is_waiting(&self, channel_id: &str, author_id: &str) -> bool {
        self.lock()
            .iter()
            .any(|w| w.matches(channel_id, author_id) && !w.tx.is_closed())
    }

    pub fn pending(&self) -> usize {
        self.lock().iter().filter(|w| !w.tx.is_closed()).count()
    }
}

/// Wait for the next message from `author_id` in `channel_id` and return its
/// text and attachments. With `delete`, the message is removed afterwards.
pub async fn read_normal_message<A: DiscordApi + ?Sized>(
    api: &A,
    waiters: &MessageWaiters,
    channel_id: &str,
    author_id: &str,
    delete: bool,
) -> Result<(String, Vec<UploadFile>), BotError> {
    let message = waiters
        .wait_for(channel_id, author_id)
        .await
        .map_err(|_| BotError::Cancelled)?;

    let files = get_files_from_message(api, &message).await?;
    if delete {
        api.delete_message_if_exists(&message.channel_id, &message.id)
            .await?;
    }
    Ok((message.content, files))
}
