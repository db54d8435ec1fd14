//! In-memory stand-in for the Discord REST API, used by unit tests.
//!
//! Messages, reactions and uploaded files live in a shared store, and every
//! call is recorded so tests can assert on what was sent.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::api::DiscordApi;
use crate::cog::{BotContext, Cog};
use crate::config::{BotConfig, PermissionRoles};
use crate::dispatcher::ErrorTracker;
use crate::error::HttpError;
use crate::reader::MessageWaiters;
use crate::types::*;

pub const BOT_ID: &str = "900";
pub const OWNER_ID: &str = "1";
pub const SUPPORTER_ROLE: &str = "501";
pub const ADMIN_ROLE: &str = "503";

/// A REST call made against [`FakeDiscord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateMessage { channel_id: String, message_id: String },
    EditMessage { message_id: String },
    DeleteMessage { message_id: String },
    CreateReaction { message_id: String, emoji: String },
    DeleteUserReaction { message_id: String, emoji: String, user_id: String },
    DeleteReactionsForEmoji { message_id: String, emoji: String },
    DeleteAllReactions { message_id: String },
}

#[derive(Default)]
struct Store {
    next_id: u64,
    messages: Vec<Message>,
    channels: HashMap<String, Channel>,
    files: HashMap<String, Vec<u8>>,
    failing_channels: HashSet<String>,
    calls: Vec<Call>,
}

impl Store {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        (1000 + self.next_id).to_string()
    }

    fn find(&mut self, channel_id: &str, message_id: &str) -> Result<&mut Message, HttpError> {
        self.messages
            .iter_mut()
            .find(|m| m.channel_id == channel_id && m.id == message_id)
            .ok_or_else(|| not_found(format!("/channels/{}/messages/{}", channel_id, message_id)))
    }

    fn insert(&mut self, channel_id: &str, author: User, content: String, files: &[UploadFile]) -> Message {
        let id = self.next_id();
        let attachments = files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let filename = file.upload_name();
                let url = format!("https://cdn.test/{}/{}/{}", channel_id, id, filename);
                self.files.insert(url.clone(), file.data.clone());
                Attachment {
                    id: format!("{}{}", id, index),
                    filename,
                    size: file.data.len() as u64,
                    proxy_url: url.clone(),
                    url,
                    content_type: None,
                }
            })
            .collect();
        let message = Message {
            id,
            channel_id: channel_id.to_string(),
            guild_id: self.channels.get(channel_id).and_then(|c| c.guild_id.clone()),
            author,
            member: None,
            content,
            attachments,
            embeds: Vec::new(),
            reactions: Vec::new(),
            message_reference: None,
        };
        self.messages.push(message.clone());
        message
    }
}

fn not_found(route: String) -> HttpError {
    HttpError::Api {
        status: 404,
        body: r#"{"message": "Unknown Message", "code": 10008}"#.into(),
        route,
    }
}

/// Discord's REST message objects never carry `guild_id`; gateway ones do.
fn as_rest(message: Message) -> Message {
    Message {
        guild_id: None,
        ..message
    }
}

pub fn bot_user() -> User {
    User {
        id: BOT_ID.into(),
        username: "helper".into(),
        discriminator: None,
        bot: true,
        global_name: None,
    }
}

pub fn user(id: &str, name: &str) -> User {
    User {
        id: id.into(),
        username: name.into(),
        discriminator: None,
        bot: false,
        global_name: None,
    }
}

/// Shared handle to the fake; clones see the same store.
#[derive(Clone, Default)]
pub struct FakeDiscord {
    store: Arc<Mutex<Store>>,
}

impl FakeDiscord {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }

    /// Register a guild text channel so `get_channel` can resolve it.
    pub fn add_text_channel(&self, guild_id: &str, channel_id: &str) {
        self.lock().channels.insert(
            channel_id.to_string(),
            Channel {
                id: channel_id.to_string(),
                kind: ChannelType::GuildText,
                guild_id: Some(guild_id.to_string()),
                name: None,
            },
        );
    }

    /// Make every message sent to `channel_id` fail with 403.
    pub fn fail_sends_to(&self, channel_id: &str) {
        self.lock().failing_channels.insert(channel_id.to_string());
    }

    /// Store a message as if `author` had posted it.
    pub fn user_message(
        &self,
        channel_id: &str,
        author: &User,
        content: &str,
        files: Vec<UploadFile>,
    ) -> Message {
        self.lock()
            .insert(channel_id, author.clone(), content.to_string(), &files)
    }

    pub fn message(&self, channel_id: &str, message_id: &str) -> Option<Message> {
        self.lock()
            .messages
            .iter()
            .find(|m| m.channel_id == channel_id && m.id == message_id)
            .cloned()
    }

    /// Every message currently in `channel_id`, oldest first.
    pub fn messages_in(&self, channel_id: &str) -> Vec<Message> {
        self.lock()
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait]
impl DiscordApi for FakeDiscord {
    async fn create_message(
        &self,
        channel_id: &str,
        msg: &CreateMessage,
    ) -> Result<Message, HttpError> {
        let mut store = self.lock();
        if store.failing_channels.contains(channel_id) {
            return Err(HttpError::Api {
                status: 403,
                body: r#"{"message": "Missing Permissions", "code": 50013}"#.into(),
                route: format!("POST /channels/{}/messages", channel_id),
            });
        }
        let content = msg.content.clone().unwrap_or_default();
        let mut message = store.insert(channel_id, bot_user(), content, &msg.files);
        message.embeds = msg
            .embeds
            .iter()
            .flatten()
            .map(|e| Embed {
                kind: Some("rich".into()),
                ..e.clone()
            })
            .collect();
        message.message_reference = msg.message_reference.clone();
        *store.find(channel_id, &message.id)? = message.clone();
        store.calls.push(Call::CreateMessage {
            channel_id: channel_id.to_string(),
            message_id: message.id.clone(),
        });
        Ok(as_rest(message))
    }

    async fn get_message(&self, channel_id: &str, message_id: &str) -> Result<Message, HttpError> {
        Ok(as_rest(self.lock().find(channel_id, message_id)?.clone()))
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        edit: &EditMessage,
    ) -> Result<Message, HttpError> {
        let mut store = self.lock();
        let message = store.find(channel_id, message_id)?;
        if let Some(content) = &edit.content {
            message.content = content.clone();
        }
        if let Some(embeds) = &edit.embeds {
            message.embeds = embeds.clone();
        }
        let message = message.clone();
        store.calls.push(Call::EditMessage {
            message_id: message_id.to_string(),
        });
        Ok(as_rest(message))
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), HttpError> {
        let mut store = self.lock();
        store.find(channel_id, message_id)?;
        store
            .messages
            .retain(|m| !(m.channel_id == channel_id && m.id == message_id));
        store.calls.push(Call::DeleteMessage {
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HttpError> {
        self.lock()
            .channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| not_found(format!("/channels/{}", channel_id)))
    }

    async fn create_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), HttpError> {
        let mut store = self.lock();
        let message = store.find(channel_id, message_id)?;
        match message
            .reactions
            .iter_mut()
            .find(|r| r.emoji.as_reaction() == emoji)
        {
            Some(reaction) if !reaction.me => {
                reaction.me = true;
                reaction.count += 1;
            }
            Some(_) => {}
            None => message.reactions.push(Reaction {
                count: 1,
                me: true,
                emoji: ReactionEmoji::unicode(emoji),
            }),
        }
        store.calls.push(Call::CreateReaction {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn delete_user_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
        user_id: &str,
    ) -> Result<(), HttpError> {
        let mut store = self.lock();
        let message = store.find(channel_id, message_id)?;
        if user_id == BOT_ID {
            message.reactions.retain(|r| !(r.me && r.emoji.as_reaction() == emoji));
        }
        store.calls.push(Call::DeleteUserReaction {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    async fn delete_all_reactions_for_emoji(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), HttpError> {
        let mut store = self.lock();
        let message = store.find(channel_id, message_id)?;
        message.reactions.retain(|r| r.emoji.as_reaction() != emoji);
        store.calls.push(Call::DeleteReactionsForEmoji {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn delete_all_reactions(&self, channel_id: &str, message_id: &str) -> Result<(), HttpError> {
        let mut store = self.lock();
        store.find(channel_id, message_id)?.reactions.clear();
        store.calls.push(Call::DeleteAllReactions {
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.lock()
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| not_found(url.to_string()))
    }
}

/// Wait until someone is reading from (`message.channel_id`, author), then
/// deliver `message` to them.
pub async fn reply_when_waiting(waiters: &MessageWaiters, message: Message) {
    while !waiters.is_waiting(&message.channel_id, &message.author.id) {
        tokio::task::yield_now().await;
    }
    assert!(waiters.offer(&message), "reply was not consumed");
}

/// Tracker that remembers which events reported an error.
#[derive(Clone, Default)]
pub struct RecordingTracker {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingTracker {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ErrorTracker for RecordingTracker {
    fn capture(&self, event: &str, _error: &(dyn std::error::Error + 'static)) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

pub fn test_config() -> BotConfig {
    BotConfig {
        token: "token".into(),
        owner_id: Some(OWNER_ID.into()),
        default_prefix: ".".into(),
        logging_changelog: None,
        logging_alert: None,
        roles: PermissionRoles {
            supporter: vec![SUPPORTER_ROLE.into()],
            moderator: vec!["502".into()],
            admin: vec![ADMIN_ROLE.into()],
        },
    }
}

/// A context backed by `fake`, with the bot logged in and every built-in
/// command registered.
pub fn bot_context(fake: &FakeDiscord) -> (BotContext, RecordingTracker) {
    let tracker = RecordingTracker::default();
    let bot = BotContext::new(Arc::new(fake.clone()), test_config(), Arc::new(tracker.clone()));
    bot.set_bot_user(bot_user());
    for cog in crate::cogs::default_cogs() {
        bot.add_commands(cog.commands());
    }
    (bot, tracker)
}
