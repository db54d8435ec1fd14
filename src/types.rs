//! Typed representations of the Discord API objects the bot touches.
//!
//! These mirror the Discord API docs so gateway events and REST responses
//! deserialize straight into structs, and the rest of the crate never has to
//! poke at `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Discord IDs are snowflakes transmitted as strings in JSON.
pub type Snowflake = String;

/// Filename prefix Discord uses to mark an attachment as a spoiler.
pub const SPOILER_PREFIX: &str = "SPOILER_";

// ---------------------------------------------------------------------------
// Gateway payload (the envelope that wraps every WS message)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayPayload {
    pub op: u8,
    pub d: Option<serde_json::Value>,
    pub s: Option<u64>,
    pub t: Option<String>,
}

// ---------------------------------------------------------------------------
// User / member
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    pub discriminator: Option<String>,
    #[serde(default)]
    pub bot: bool,
    pub global_name: Option<String>,
}

impl User {
    /// `<@id>`, the form Discord renders as a clickable mention.
    pub fn mention(&self) -> String {
        user_mention(&self.id)
    }

    /// `Username#Discriminator` or just `Username` for the new username system.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some("0") | None => self.username.clone(),
            Some(disc) => format!("{}#{}", self.username, disc),
        }
    }
}

pub fn user_mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}

pub fn channel_mention(channel_id: &str) -> String {
    format!("<#{}>", channel_id)
}

/// Guild member as attached to MESSAGE_CREATE and MESSAGE_REACTION_ADD.
///
/// The `user` field is absent on the member object embedded in messages
/// (the author lives on the message itself).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Member {
    pub user: Option<User>,
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum ChannelType {
    GuildText = 0,
    Dm = 1,
    GuildVoice = 2,
    GroupDm = 3,
    GuildCategory = 4,
    GuildAnnouncement = 5,
    AnnouncementThread = 10,
    PublicThread = 11,
    PrivateThread = 12,
    GuildStageVoice = 13,
    GuildDirectory = 14,
    GuildForum = 15,
}

impl ChannelType {
    /// Whether regular messages can be posted in this channel type.
    pub fn is_messageable(self) -> bool {
        matches!(
            self,
            ChannelType::GuildText
                | ChannelType::Dm
                | ChannelType::GroupDm
                | ChannelType::GuildAnnouncement
                | ChannelType::AnnouncementThread
                | ChannelType::PublicThread
                | ChannelType::PrivateThread
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Channel {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    pub guild_id: Option<Snowflake>,
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub author: User,
    /// Present on gateway MESSAGE_CREATE events in guilds.
    pub member: Option<Member>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub message_reference: Option<MessageReference>,
}

/// Client link to a message; `None` for a DM channel.
pub fn message_link(guild_id: Option<&str>, channel_id: &str, message_id: &str) -> String {
    format!(
        "https://discord.com/channels/{}/{}/{}",
        guild_id.unwrap_or("@me"),
        channel_id,
        message_id
    )
}

impl Message {
    /// Link that jumps to this message in the client.
    /// REST responses carry no `guild_id`; use [`message_link`] when the
    /// guild is known from elsewhere.
    pub fn jump_url(&self) -> String {
        message_link(self.guild_id.as_deref(), &self.channel_id, &self.id)
    }

    /// The emoji the bot itself has reacted with, in display order.
    pub fn own_reactions(&self) -> Vec<String> {
        self.reactions
            .iter()
            .filter(|r| r.me)
            .map(|r| r.emoji.as_reaction())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Snowflake>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Snowflake>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub fail_if_not_exists: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Attachment {
    pub id: Snowflake,
    pub filename: String,
    pub size: u64,
    pub url: String,
    pub proxy_url: String,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn is_spoiler(&self) -> bool {
        self.filename.starts_with(SPOILER_PREFIX)
    }
}

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Reaction {
    pub count: u32,
    #[serde(default)]
    pub me: bool,
    pub emoji: ReactionEmoji,
}

/// Either a unicode emoji (`id` is `None`) or a guild custom emoji.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReactionEmoji {
    pub id: Option<Snowflake>,
    pub name: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

impl ReactionEmoji {
    pub fn unicode(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            animated: false,
        }
    }

    /// The form used in reaction REST routes: the raw unicode symbol, or
    /// `name:id` for custom emoji.
    pub fn as_reaction(&self) -> String {
        match (&self.id, &self.name) {
            (Some(id), Some(name)) => format!("{}:{}", name, id),
            (Some(id), None) => format!("_:{}", id),
            (None, Some(name)) => name.clone(),
            (None, None) => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Embed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Embed {
    /// `rich` for embeds built by bots; link previews use other types.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    /// Embeds without an explicit type are treated as rich, which is what
    /// Discord assigns to every embed a bot sends.
    pub fn is_rich(&self) -> bool {
        self.kind.as_deref().map_or(true, |k| k == "rich")
    }

    /// Whether the embed has anything Discord would render.
    pub fn is_empty(&self) -> bool {
        self.title.as_deref().map_or(true, str::is_empty)
            && self.description.as_deref().map_or(true, str::is_empty)
            && self.fields.is_empty()
            && self.footer.is_none()
    }

    /// Remove the first field named `name`, returning whether one was found.
    pub fn remove_field(&mut self, name: &str) -> bool {
        match self.fields.iter().position(|f| f.name == name) {
            Some(index) => {
                self.fields.remove(index);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

// ---------------------------------------------------------------------------
// Guild
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Guild {
    pub id: Snowflake,
    pub name: String,
    pub owner_id: Option<Snowflake>,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

// ---------------------------------------------------------------------------
// Dispatch payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadyEvent {
    pub v: u8,
    pub user: User,
    pub session_id: String,
    pub resume_gateway_url: String,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
}

/// MESSAGE_REACTION_ADD. Carries ids only; the message itself is not sent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReactionAdd {
    pub user_id: Snowflake,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub member: Option<Member>,
    pub emoji: ReactionEmoji,
}

impl ReactionAdd {
    pub fn is_from_bot(&self) -> bool {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .map_or(false, |u| u.bot)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageDelete {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
}

// ---------------------------------------------------------------------------
// Outbound bodies
// ---------------------------------------------------------------------------

/// A file held in memory, ready to be uploaded with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub data: Vec<u8>,
    pub spoiler: bool,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
            spoiler: false,
        }
    }

    /// Filename as sent to Discord, carrying the spoiler marker if set.
    pub fn upload_name(&self) -> String {
        if self.spoiler && !self.filename.starts_with(SPOILER_PREFIX) {
            format!("{}{}", SPOILER_PREFIX, self.filename)
        } else {
            self.filename.clone()
        }
    }
}

/// Attachment metadata sent inside `payload_json` for multipart uploads.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentSlot {
    pub id: usize,
    pub filename: String,
}

/// Body for `POST /channels/{id}/messages`.
///
/// `files` never goes into the JSON; when non-empty the HTTP client switches
/// to a multipart upload and describes each file in `attachments`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,
    #[serde(skip)]
    pub files: Vec<UploadFile>,
}

impl CreateMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, text: impl Into<String>) -> Self {
        self.content = Some(text.into());
        self
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.get_or_insert_with(Vec::new).push(embed);
        self
    }

    pub fn files(mut self, files: Vec<UploadFile>) -> Self {
        self.files = files;
        self
    }

    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.message_reference = Some(MessageReference {
            message_id: Some(message_id.into()),
            channel_id: None,
            guild_id: None,
            fail_if_not_exists: false,
        });
        self
    }
}

/// Body for `PATCH /channels/{id}/messages/{id}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EditMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
}

impl EditMessage {
    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: Some(vec![embed]),
        }
    }
}

// ---------------------------------------------------------------------------
// Rate-limit info parsed from response headers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    pub remaining: Option<u32>,
    pub reset_after: Option<f64>,
    pub bucket: Option<String>,
    pub is_global: bool,
}
