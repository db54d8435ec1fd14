//! The compose-message dialog: root embed rendering and reaction handling.
//!
//! The root message is a bot embed naming the author and the target
//! channel. Its reactions are the menu; clicking one runs the matching
//! handler below, which may prompt the author for a reply, then re-renders
//! the preview of the draft and the menu for the current mode.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use super::session::{DialogSession, Draft, Mode};
use crate::api::{DiscordApi, DiscordApiExt};
use crate::cog::BotContext;
use crate::content::read_complete_message;
use crate::dispatcher::make_error;
use crate::error::BotError;
pub use crate::reactions::same_emoji;
use crate::reactions::update_reactions;
use crate::reader::read_normal_message;
use crate::types::*;

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

pub const PENCIL: &str = "✏️";
pub const FILE_FOLDER: &str = "📁";
pub const CLIPBOARD: &str = "📋";
pub const WHITE_CHECK_MARK: &str = "✅";
pub const X: &str = "❌";
pub const LABEL: &str = "🏷";
pub const PAINTBRUSH: &str = "🖌";
pub const ARROW_LEFT: &str = "⬅";
pub const WASTEBASKET: &str = "🗑";

pub const COMPOSE_MESSAGE: &str = "Compose Message";
pub const DIALOG_COLOR: u32 = 0x03AD28;
pub const AUTHOR_FIELD: &str = "Author";
pub const CHANNEL_FIELD: &str = "Channel";
pub const PREVIEW_FIELD: &str = "Preview";

pub const MSG_DLG_INTRO: &str = "Use the reactions below to compose your message.\n\
    :pencil2: Set the text\n\
    :file_folder: Attach files\n\
    :clipboard: Edit the embed\n\
    :x: Cancel";
pub const MSG_DLG_SEND: &str = "\n:white_check_mark: Send the message";
pub const MSG_DLG_EMBED: &str = "Use the reactions below to edit the embed.\n\
    :label: Set the title\n\
    :pencil2: Set the description\n\
    :paintbrush: Set the color\n\
    :arrow_left: Back\n\
    :wastebasket: Remove the embed";
pub const MSG_SENT: &str = ":white_check_mark: Message has been sent";

const SEND_MESSAGE: &str = "Please send the text of the message. Send `.` to clear it.";
const SEND_FILE: &str = "Please send the files to attach. Send a message without attachments to remove them.";
const SEND_EMBED_TITLE: &str = "Please send the title of the embed. Send `.` to clear it.";
const SEND_EMBED_CONTENT: &str = "Please send the description of the embed. Send `.` to clear it.";
const SEND_EMBED_COLOR: &str = "Please send the color of the embed, e.g. `#03AD28`.";
const MSG_COULD_NOT_BE_SENT: &str = "Message could not be sent.";
const INVALID_COLOR: &str = "Invalid color. Use six hex digits like `#03AD28`.";
const TITLE_TOO_LONG: &str = "The title must not be longer than 256 characters.";
const DESCRIPTION_TOO_LONG: &str = "The description must not be longer than 4096 characters.";

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
/// How long invalid-input notices stay visible.
pub const TRANSIENT_ERROR_TTL: Duration = Duration::from_secs(3);

/// Whether the dialog is still running after handling a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Open,
    Closed,
}

/// The menu for `mode`; main mode offers sending only with something to send.
pub fn canonical_reactions(mode: Mode, draft: &Draft) -> Vec<&'static str> {
    match mode {
        Mode::Main => {
            let mut reactions = vec![PENCIL, FILE_FOLDER, CLIPBOARD, X];
            if !draft.is_empty() {
                reactions.push(WHITE_CHECK_MARK);
            }
            reactions
        }
        Mode::EmbedEdit => vec![LABEL, PENCIL, PAINTBRUSH, ARROW_LEFT, WASTEBASKET],
    }
}

fn banner(mode: Mode, draft: &Draft) -> String {
    match mode {
        Mode::Main if draft.is_empty() => MSG_DLG_INTRO.to_string(),
        Mode::Main => format!("{}{}", MSG_DLG_INTRO, MSG_DLG_SEND),
        Mode::EmbedEdit => MSG_DLG_EMBED.to_string(),
    }
}

static COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?([0-9a-fA-F]{6})$").expect("color pattern is valid"));

/// Parse `#rrggbb` or `rrggbb`.
pub fn parse_color(text: &str) -> Option<u32> {
    let hex = COLOR_RE.captures(text)?.get(1)?.as_str();
    u32::from_str_radix(hex, 16).ok()
}

// ---------------------------------------------------------------------------
// Start and render
// ---------------------------------------------------------------------------

/// Post the root embed in `channel_id` and show the main menu.
pub async fn create_message_dialog(
    bot: &BotContext,
    guild_id: &str,
    channel_id: &str,
    author: &User,
    target: &Channel,
) -> Result<DialogSession, BotError> {
    let root_embed = Embed::new()
        .title(COMPOSE_MESSAGE)
        .color(DIALOG_COLOR)
        .description(MSG_DLG_INTRO)
        .field(AUTHOR_FIELD, author.mention(), true)
        .field(CHANNEL_FIELD, channel_mention(&target.id), true);
    let root = bot
        .api
        .create_message(channel_id, &CreateMessage::new().embed(root_embed.clone()))
        .await?;

    let session = DialogSession {
        guild_id: guild_id.to_string(),
        channel_id: channel_id.to_string(),
        root_id: root.id.clone(),
        author: author.clone(),
        target_channel_id: target.id.clone(),
        mode: Mode::Main,
        preview: None,
        draft: Draft::default(),
        saved_embed: None,
        root_embed,
        interrupt: Default::default(),
    };
    let menu = canonical_reactions(session.mode, &session.draft);
    update_reactions(&*bot.api, channel_id, &root.id, &[], &menu[..]).await?;

    info!(
        root_id = %root.id,
        author = %author.tag(),
        target_channel_id = %target.id,
        "compose dialog started"
    );
    Ok(session)
}

/// Redraw the preview, the root embed and the menu from the session state.
pub async fn render(bot: &BotContext, session: &mut DialogSession) -> Result<(), BotError> {
    let api = &*bot.api;
    if let Some(stale) = session.preview.take() {
        api.delete_message_if_exists(&session.channel_id, &stale)
            .await?;
    }

    session.root_embed.remove_field(PREVIEW_FIELD);
    if !session.draft.is_empty() {
        let mut msg = CreateMessage::new().files(session.draft.files.clone());
        if !session.draft.content.is_empty() {
            msg = msg.content(session.draft.content.clone());
        }
        if let Some(embed) = session.draft.visible_embed() {
            msg = msg.embed(embed.clone());
        }
        let preview = api.create_message(&session.channel_id, &msg).await?;
        let link = message_link(Some(&session.guild_id), &session.channel_id, &preview.id);
        session.root_embed =
            std::mem::take(&mut session.root_embed).field(PREVIEW_FIELD, link, false);
        session.preview = Some(preview.id);
    }
    session.root_embed.description = Some(banner(session.mode, &session.draft));

    let root = api
        .edit_message(
            &session.channel_id,
            &session.root_id,
            &EditMessage::embed(session.root_embed.clone()),
        )
        .await?;
    let menu = canonical_reactions(session.mode, &session.draft);
    update_reactions(
        api,
        &session.channel_id,
        &session.root_id,
        &root.own_reactions(),
        &menu[..],
    )
    .await?;
    debug!(root_id = %session.root_id, mode = ?session.mode, preview = ?session.preview, "dialog rendered");
    Ok(())
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Ask the author for a message, wait for it, then remove both.
///
/// Raising the session's interrupt abandons the wait with `Cancelled`.
async fn read_with_prompt(
    bot: &BotContext,
    session: &DialogSession,
    prompt: &str,
) -> Result<(String, Vec<UploadFile>), BotError> {
    let tmp = bot.api.send_text(&session.channel_id, prompt).await?;
    let reply = tokio::select! {
        reply = read_normal_message(
            &*bot.api,
            &bot.waiters,
            &session.channel_id,
            &session.author.id,
            true,
        ) => reply,
        _ = session.interrupt.raised() => Err(BotError::Cancelled),
    };
    bot.api
        .delete_message_if_exists(&session.channel_id, &tmp.id)
        .await?;
    reply
}

/// Like [`read_with_prompt`], but text only; a lone `.` means empty.
async fn read_text(
    bot: &BotContext,
    session: &DialogSession,
    prompt: &str,
) -> Result<String, BotError> {
    let (text, _) = read_with_prompt(bot, session, prompt).await?;
    Ok(if text == "." { String::new() } else { text })
}

/// Post an error that removes itself after [`TRANSIENT_ERROR_TTL`].
async fn send_transient_error(
    bot: &BotContext,
    channel_id: &str,
    text: &str,
) -> Result<(), BotError> {
    let notice = bot.api.send_text(channel_id, &make_error(text)).await?;
    let api = bot.api.clone();
    let channel_id = channel_id.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(TRANSIENT_ERROR_TTL).await;
        if let Err(e) = api.delete_message_if_exists(&channel_id, &notice.id).await {
            warn!(error = %e, message_id = %notice.id, "failed to delete transient error");
        }
    });
    Ok(())
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

// ---------------------------------------------------------------------------
// Main menu
// ---------------------------------------------------------------------------

pub async fn handle_main_menu(
    bot: &BotContext,
    session: &mut DialogSession,
    emoji: &str,
) -> Result<Outcome, BotError> {
    if same_emoji(emoji, X) {
        bot.api
            .delete_message_if_exists(&session.channel_id, &session.root_id)
            .await?;
        if let Some(preview) = session.preview.take() {
            bot.api
                .delete_message_if_exists(&session.channel_id, &preview)
                .await?;
        }
        info!(root_id = %session.root_id, "compose dialog cancelled");
        return Ok(Outcome::Closed);
    }

    if same_emoji(emoji, WHITE_CHECK_MARK) {
        return send_draft(bot, session).await;
    }

    if same_emoji(emoji, PENCIL) {
        session.draft.content = read_text(bot, session, SEND_MESSAGE).await?;
    } else if same_emoji(emoji, FILE_FOLDER) {
        let (_, files) = read_with_prompt(bot, session, SEND_FILE).await?;
        session.draft.files = files;
    } else if same_emoji(emoji, CLIPBOARD) {
        session.saved_embed = session.draft.embed.clone();
        session.draft.embed.get_or_insert_with(Embed::new);
        session.mode = Mode::EmbedEdit;
    } else {
        return Ok(Outcome::Open);
    }

    render(bot, session).await?;
    Ok(Outcome::Open)
}

/// Copy the preview into the target channel and close the dialog.
async fn send_draft(bot: &BotContext, session: &mut DialogSession) -> Result<Outcome, BotError> {
    if session.draft.is_empty() {
        return Ok(Outcome::Open);
    }
    let preview = match &session.preview {
        Some(id) => bot.api.find_message(&session.channel_id, id).await?,
        None => None,
    };
    let Some(preview) = preview else {
        debug!(root_id = %session.root_id, "nothing to send, preview is gone");
        return Ok(Outcome::Open);
    };

    let snapshot = read_complete_message(&*bot.api, &preview).await?;
    let mut msg = CreateMessage::new().files(snapshot.files);
    if let Some(content) = non_empty(snapshot.content) {
        msg = msg.content(content);
    }
    if let Some(embed) = snapshot.embed {
        msg = msg.embed(embed);
    }

    if let Err(e) = bot
        .api
        .create_message(&session.target_channel_id, &msg)
        .await
    {
        warn!(
            error = %e,
            target_channel_id = %session.target_channel_id,
            "failed to send composed message"
        );
        bot.api
            .send_text(&session.channel_id, &make_error(MSG_COULD_NOT_BE_SENT))
            .await?;
        return Ok(Outcome::Open);
    }

    bot.api
        .delete_all_reactions(&session.channel_id, &session.root_id)
        .await?;
    session.root_embed.description = Some(MSG_SENT.to_string());
    bot.api
        .edit_message(
            &session.channel_id,
            &session.root_id,
            &EditMessage::embed(session.root_embed.clone()),
        )
        .await?;
    info!(
        root_id = %session.root_id,
        target_channel_id = %session.target_channel_id,
        "composed message sent"
    );
    Ok(Outcome::Closed)
}

// ---------------------------------------------------------------------------
// Embed menu
// ---------------------------------------------------------------------------

pub async fn handle_embed_menu(
    bot: &BotContext,
    session: &mut DialogSession,
    emoji: &str,
) -> Result<Outcome, BotError> {
    if let Some(preview) = &session.preview {
        if bot
            .api
            .find_message(&session.channel_id, preview)
            .await?
            .is_none()
        {
            debug!(root_id = %session.root_id, "preview vanished, resetting dialog");
            session.preview = None;
            session.draft = Draft::default();
            session.saved_embed = None;
            session.mode = Mode::Main;
            render(bot, session).await?;
            return Ok(Outcome::Open);
        }
    }

    if same_emoji(emoji, LABEL) {
        let title = read_text(bot, session, SEND_EMBED_TITLE).await?;
        if title.chars().count() > MAX_TITLE_LEN {
            send_transient_error(bot, &session.channel_id, TITLE_TOO_LONG).await?;
            return Ok(Outcome::Open);
        }
        session.draft.embed.get_or_insert_with(Embed::new).title = non_empty(title);
    } else if same_emoji(emoji, PENCIL) {
        let description = read_text(bot, session, SEND_EMBED_CONTENT).await?;
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            send_transient_error(bot, &session.channel_id, DESCRIPTION_TOO_LONG).await?;
            return Ok(Outcome::Open);
        }
        session.draft.embed.get_or_insert_with(Embed::new).description = non_empty(description);
    } else if same_emoji(emoji, PAINTBRUSH) {
        let text = read_text(bot, session, SEND_EMBED_COLOR).await?;
        let Some(color) = parse_color(&text) else {
            send_transient_error(bot, &session.channel_id, INVALID_COLOR).await?;
            return Ok(Outcome::Open);
        };
        session.draft.embed.get_or_insert_with(Embed::new).color = Some(color);
    } else if same_emoji(emoji, ARROW_LEFT) {
        session.draft.embed = session.saved_embed.take();
        session.mode = Mode::Main;
    } else if same_emoji(emoji, WASTEBASKET) {
        session.draft.embed = None;
        session.saved_embed = None;
        session.mode = Mode::Main;
    } else {
        return Ok(Outcome::Open);
    }

    render(bot, session).await?;
    Ok(Outcome::Open)
}
