//! Dialog sessions and the registry that owns them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::debug;

use crate::types::{Embed, Snowflake, UploadFile, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Main,
    EmbedEdit,
}

/// The message being composed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub content: String,
    pub files: Vec<UploadFile>,
    pub embed: Option<Embed>,
}

impl Draft {
    /// The embed, if it has anything Discord would render.
    pub fn visible_embed(&self) -> Option<&Embed> {
        self.embed.as_ref().filter(|e| !e.is_empty())
    }

    /// Nothing to preview or send.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.files.is_empty() && self.visible_embed().is_none()
    }
}

/// Aborts whatever prompt one session is waiting on, without touching the
/// prompts of other dialogs.
///
/// A raised interrupt stays raised until [`Interrupt::clear`], so a prompt
/// that starts after the raise still sees it.
#[derive(Debug, Default)]
pub struct Interrupt {
    raised: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Only called with the session lock held, so no prompt is running.
    pub fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Resolves once [`Interrupt::raise`] has been called.
    pub async fn raised(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent raise is not lost.
        notified.as_mut().enable();
        if self.is_raised() {
            return;
        }
        notified.await;
    }
}

/// One compose-message dialog, keyed by its root message.
#[derive(Debug, Clone)]
pub struct DialogSession {
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
    pub root_id: Snowflake,
    pub author: User,
    pub target_channel_id: Snowflake,
    pub mode: Mode,
    /// The rendered draft, if one is currently shown.
    pub preview: Option<Snowflake>,
    pub draft: Draft,
    /// Embed as it was when embed editing started, restored by "back".
    pub saved_embed: Option<Embed>,
    /// Last embed written to the root message.
    pub root_embed: Embed,
    pub interrupt: Arc<Interrupt>,
}

pub type SharedSession = Arc<tokio::sync::Mutex<DialogSession>>;

/// A registered session plus the identity needed while it is locked.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub channel_id: Snowflake,
    pub author_id: Snowflake,
    /// Shared with the locked session so a click can stop its prompt.
    pub interrupt: Arc<Interrupt>,
    pub state: SharedSession,
}

/// Live dialogs by root message id. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Snowflake, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Snowflake, SessionHandle>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, session: DialogSession) -> SessionHandle {
        let root_id = session.root_id.clone();
        let handle = SessionHandle {
            channel_id: session.channel_id.clone(),
            author_id: session.author.id.clone(),
            interrupt: session.interrupt.clone(),
            state: Arc::new(tokio::sync::Mutex::new(session)),
        };
        self.lock().insert(root_id, handle.clone());
        handle
    }

    pub fn get(&self, root_id: &str) -> Option<SessionHandle> {
        self.lock().get(root_id).cloned()
    }

    pub fn remove(&self, root_id: &str) -> Option<SessionHandle> {
        let removed = self.lock().remove(root_id);
        if removed.is_some() {
            debug!(root_id, "dialog session closed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
