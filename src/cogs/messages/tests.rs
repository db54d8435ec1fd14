use std::sync::Arc;
use std::time::Duration;

use super::dialog::*;
use super::session::{DialogSession, Mode};
use super::*;
use crate::api::DiscordApi;
use crate::testing::{bot_context, reply_when_waiting, user, Call, FakeDiscord, OWNER_ID};
use crate::types::{Embed, Message, ReactionEmoji, UploadFile, User};

const GUILD: &str = "10";
const COMPOSE: &str = "20";
const TARGET: &str = "30";

struct Harness {
    fake: FakeDiscord,
    bot: BotContext,
    cog: Arc<MessagesCog>,
    author: User,
    root: String,
}

impl Harness {
    async fn start() -> Harness {
        let fake = FakeDiscord::new();
        fake.add_text_channel(GUILD, COMPOSE);
        fake.add_text_channel(GUILD, TARGET);
        let (bot, _) = bot_context(&fake);
        let cog = Arc::new(MessagesCog::new());
        let author = user(OWNER_ID, "owner");

        let command = fake.user_message(COMPOSE, &author, ".test <#30>", vec![]);
        let ctx = Context::parse(command, &[".".to_string()]).unwrap();
        cog.on_command(&bot, &ctx).await.unwrap();

        let root = fake
            .messages_in(COMPOSE)
            .into_iter()
            .find(|m| m.embeds.first().and_then(|e| e.title.as_deref()) == Some(COMPOSE_MESSAGE))
            .unwrap()
            .id;
        Harness {
            fake,
            bot,
            cog,
            author,
            root,
        }
    }

    fn event(&self, user_id: &str, emoji: &str) -> ReactionAdd {
        ReactionAdd {
            user_id: user_id.into(),
            channel_id: COMPOSE.into(),
            message_id: self.root.clone(),
            guild_id: Some(GUILD.into()),
            member: None,
            emoji: ReactionEmoji::unicode(emoji),
        }
    }

    /// Run a click in the background, e.g. one that opens a prompt.
    fn spawn_click(
        &self,
        event: ReactionAdd,
    ) -> tokio::task::JoinHandle<Result<EventFlow, BotError>> {
        let cog = self.cog.clone();
        let bot = self.bot.clone();
        tokio::spawn(async move { cog.on_raw_reaction_add(&bot, &event).await })
    }

    async fn wait_for_prompt(&self) {
        while !self.bot.waiters.is_waiting(COMPOSE, OWNER_ID) {
            tokio::task::yield_now().await;
        }
    }

    async fn click(&self, emoji: &str) -> EventFlow {
        self.cog
            .on_raw_reaction_add(&self.bot, &self.event(OWNER_ID, emoji))
            .await
            .unwrap()
    }

    /// Click `emoji` and answer the prompt it opens with `text`.
    async fn click_and_reply(&self, emoji: &str, text: &str, files: Vec<UploadFile>) -> EventFlow {
        let reply = self.fake.user_message(COMPOSE, &self.author, text, files);
        let (flow, _) = tokio::join!(
            self.click(emoji),
            reply_when_waiting(&self.bot.waiters, reply)
        );
        flow
    }

    fn root_message(&self) -> Option<Message> {
        self.fake.message(COMPOSE, &self.root)
    }

    fn root_embed(&self) -> Embed {
        self.root_message().unwrap().embeds[0].clone()
    }

    fn reactions(&self) -> Vec<String> {
        self.root_message().unwrap().own_reactions()
    }

    async fn session(&self) -> DialogSession {
        self.cog
            .sessions()
            .get(&self.root)
            .unwrap()
            .state
            .lock()
            .await
            .clone()
    }

    async fn preview(&self) -> Message {
        let id = self.session().await.preview.unwrap();
        self.fake.message(COMPOSE, &id).unwrap()
    }

    /// Bot messages in the compose channel other than the root.
    fn bot_messages(&self) -> Vec<Message> {
        self.fake
            .messages_in(COMPOSE)
            .into_iter()
            .filter(|m| m.author.bot && m.id != self.root)
            .collect()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn start_posts_root_with_main_menu() {
    let h = Harness::start().await;
    let embed = h.root_embed();
    assert_eq!(embed.color, Some(DIALOG_COLOR));
    assert_eq!(embed.description.as_deref(), Some(MSG_DLG_INTRO));
    assert_eq!(embed.fields[0].name, AUTHOR_FIELD);
    assert_eq!(embed.fields[0].value, "<@1>");
    assert_eq!(embed.fields[1].value, "<#30>");
    assert_eq!(h.reactions(), strings(&[PENCIL, FILE_FOLDER, CLIPBOARD, X]));
    assert_eq!(h.cog.sessions().len(), 1);
}

#[tokio::test]
async fn compose_text_and_send() {
    let h = Harness::start().await;

    assert_eq!(h.click_and_reply(PENCIL, "hello", vec![]).await, EventFlow::Stop);
    assert_eq!(h.preview().await.content, "hello");
    assert_eq!(
        h.reactions(),
        strings(&[PENCIL, FILE_FOLDER, CLIPBOARD, X, WHITE_CHECK_MARK])
    );
    let embed = h.root_embed();
    let preview_field = embed.fields.iter().find(|f| f.name == PREVIEW_FIELD).unwrap();
    assert_eq!(
        preview_field.value,
        format!("https://discord.com/channels/10/20/{}", h.preview().await.id)
    );
    assert!(embed.description.unwrap().ends_with(MSG_DLG_SEND));
    // Prompt and reply are cleaned up; only the preview remains.
    assert_eq!(h.bot_messages().len(), 1);
    assert!(!h
        .fake
        .messages_in(COMPOSE)
        .iter()
        .any(|m| !m.author.bot && m.content == "hello"));

    h.click(WHITE_CHECK_MARK).await;
    let sent = h.fake.messages_in(TARGET);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content, "hello");
    assert!(h.reactions().is_empty());
    assert_eq!(h.root_embed().description.as_deref(), Some(MSG_SENT));
    assert!(h.cog.sessions().is_empty());

    // The finished dialog no longer reacts.
    h.fake.clear_calls();
    assert_eq!(h.click(PENCIL).await, EventFlow::Continue);
    assert!(h.fake.calls().is_empty());
}

#[tokio::test]
async fn send_is_a_no_op_without_a_draft() {
    let h = Harness::start().await;
    h.click(WHITE_CHECK_MARK).await;
    assert!(h.fake.messages_in(TARGET).is_empty());
    assert_eq!(h.cog.sessions().len(), 1);
    assert_eq!(h.root_embed().description.as_deref(), Some(MSG_DLG_INTRO));
}

#[tokio::test]
async fn failed_send_keeps_the_dialog_open() {
    let h = Harness::start().await;
    h.fake.fail_sends_to(TARGET);
    h.click_and_reply(PENCIL, "hello", vec![]).await;

    h.click(WHITE_CHECK_MARK).await;
    assert_eq!(h.cog.sessions().len(), 1);
    assert!(h.reactions().contains(&WHITE_CHECK_MARK.to_string()));
    let notice = h.bot_messages().pop().unwrap();
    assert_eq!(
        notice.content,
        crate::dispatcher::make_error("Message could not be sent.")
    );
}

#[tokio::test]
async fn files_are_previewed_and_sent() {
    let h = Harness::start().await;
    let mut spoiler = UploadFile::new("secret.png", vec![1, 2, 3]);
    spoiler.spoiler = true;
    h.click_and_reply(FILE_FOLDER, "", vec![spoiler]).await;

    let preview = h.preview().await;
    assert_eq!(preview.attachments[0].filename, "SPOILER_secret.png");
    assert_eq!(h.session().await.draft.files.len(), 1);

    h.click(WHITE_CHECK_MARK).await;
    let sent = h.fake.messages_in(TARGET);
    assert_eq!(sent[0].attachments[0].filename, "SPOILER_secret.png");
    assert_eq!(
        h.fake.download(&sent[0].attachments[0].url).await.unwrap(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn dot_clears_the_text() {
    let h = Harness::start().await;
    h.click_and_reply(PENCIL, "hello", vec![]).await;
    h.click_and_reply(PENCIL, ".", vec![]).await;
    let session = h.session().await;
    assert!(session.draft.content.is_empty());
    assert!(session.preview.is_none());
    assert!(h.bot_messages().is_empty());
    assert_eq!(h.reactions(), strings(&[PENCIL, FILE_FOLDER, CLIPBOARD, X]));
    assert!(!h.root_embed().fields.iter().any(|f| f.name == PREVIEW_FIELD));
}

#[tokio::test]
async fn cancel_deletes_root_and_preview() {
    let h = Harness::start().await;
    h.click_and_reply(PENCIL, "draft", vec![]).await;
    let preview = h.preview().await.id;

    h.click(X).await;
    assert!(h.root_message().is_none());
    assert!(h.fake.message(COMPOSE, &preview).is_none());
    assert!(h.cog.sessions().is_empty());

    h.fake.clear_calls();
    assert_eq!(h.click(PENCIL).await, EventFlow::Continue);
    assert!(h.fake.calls().is_empty());
}

#[tokio::test]
async fn embed_editing_and_back_restores_the_draft() {
    let h = Harness::start().await;
    h.click_and_reply(PENCIL, "hello", vec![]).await;

    h.click(CLIPBOARD).await;
    assert_eq!(h.session().await.mode, Mode::EmbedEdit);
    assert_eq!(
        h.reactions(),
        strings(&[LABEL, PENCIL, PAINTBRUSH, ARROW_LEFT, WASTEBASKET])
    );
    assert_eq!(h.root_embed().description.as_deref(), Some(MSG_DLG_EMBED));

    h.click_and_reply(LABEL, "Title", vec![]).await;
    h.click_and_reply(PENCIL, "Body", vec![]).await;
    h.click_and_reply(PAINTBRUSH, "#ff0000", vec![]).await;
    let preview = h.preview().await;
    assert_eq!(preview.content, "hello");
    let embed = &preview.embeds[0];
    assert_eq!(embed.title.as_deref(), Some("Title"));
    assert_eq!(embed.description.as_deref(), Some("Body"));
    assert_eq!(embed.color, Some(0xff0000));

    h.click(ARROW_LEFT).await;
    let session = h.session().await;
    assert_eq!(session.mode, Mode::Main);
    assert_eq!(session.draft.content, "hello");
    assert!(session.draft.embed.is_none());
    let previews = h.bot_messages();
    assert_eq!(previews.len(), 1);
    assert!(previews[0].embeds.is_empty());
    assert_eq!(
        h.reactions(),
        strings(&[PENCIL, FILE_FOLDER, CLIPBOARD, X, WHITE_CHECK_MARK])
    );
}

#[tokio::test]
async fn back_discards_an_embed_only_draft() {
    let h = Harness::start().await;
    h.click(CLIPBOARD).await;
    h.click_and_reply(LABEL, "First", vec![]).await;
    assert_eq!(h.bot_messages().len(), 1);

    h.click(ARROW_LEFT).await;
    let session = h.session().await;
    assert_eq!(session.mode, Mode::Main);
    assert!(session.draft.is_empty());
    assert!(session.preview.is_none());
    assert!(h.bot_messages().is_empty());
    assert_eq!(h.reactions(), strings(&[PENCIL, FILE_FOLDER, CLIPBOARD, X]));
}

#[tokio::test]
async fn wastebasket_clears_the_embed() {
    let h = Harness::start().await;
    h.click(CLIPBOARD).await;
    h.click_and_reply(LABEL, "Title", vec![]).await;
    assert_eq!(h.bot_messages().len(), 1);

    h.click(WASTEBASKET).await;
    let session = h.session().await;
    assert_eq!(session.mode, Mode::Main);
    assert!(session.draft.embed.is_none());
    assert!(h.bot_messages().is_empty());
    assert_eq!(h.reactions(), strings(&[PENCIL, FILE_FOLDER, CLIPBOARD, X]));
}

#[tokio::test(start_paused = true)]
async fn invalid_color_shows_a_transient_error() {
    let h = Harness::start().await;
    h.click(CLIPBOARD).await;
    h.click_and_reply(LABEL, "Title", vec![]).await;

    h.click_and_reply(PAINTBRUSH, "zzzzzz", vec![]).await;
    let errors: Vec<Message> = h
        .bot_messages()
        .into_iter()
        .filter(|m| m.content.starts_with(":x: Error:"))
        .collect();
    assert_eq!(errors.len(), 1);
    let session = h.session().await;
    assert_eq!(session.mode, Mode::EmbedEdit);
    assert_eq!(session.draft.embed.unwrap().color, None);

    tokio::time::sleep(TRANSIENT_ERROR_TTL + Duration::from_millis(100)).await;
    assert!(h.fake.message(COMPOSE, &errors[0].id).is_none());
}

#[tokio::test(start_paused = true)]
async fn overlong_title_is_rejected() {
    let h = Harness::start().await;
    h.click(CLIPBOARD).await;
    h.click_and_reply(LABEL, &"t".repeat(MAX_TITLE_LEN + 1), vec![]).await;
    assert!(h.session().await.draft.embed.unwrap().title.is_none());
    assert_eq!(h.bot_messages().len(), 1);

    tokio::time::sleep(TRANSIENT_ERROR_TTL * 2).await;
    assert!(h.bot_messages().is_empty());
}

#[tokio::test]
async fn vanished_preview_falls_back_to_main() {
    let h = Harness::start().await;
    h.click_and_reply(PENCIL, "hello", vec![]).await;
    h.click(CLIPBOARD).await;
    let preview = h.preview().await.id;
    h.fake.delete_message(COMPOSE, &preview).await.unwrap();

    h.click(LABEL).await;
    let session = h.session().await;
    assert_eq!(session.mode, Mode::Main);
    assert_eq!(session.draft, Default::default());
    assert_eq!(h.reactions(), strings(&[PENCIL, FILE_FOLDER, CLIPBOARD, X]));
    assert!(!h.bot.waiters.is_waiting(COMPOSE, OWNER_ID));
}

#[tokio::test]
async fn render_is_idempotent() {
    let h = Harness::start().await;
    h.click_and_reply(PENCIL, "hello", vec![]).await;
    let handle = h.cog.sessions().get(&h.root).unwrap();

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let mut session = handle.state.lock().await;
        render(&h.bot, &mut session).await.unwrap();
        drop(session);
        snapshots.push((h.root_embed().description, h.reactions(), h.bot_messages().len()));
    }
    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[0].2, 1);
}

#[tokio::test]
async fn clicks_are_always_retracted_but_only_the_author_counts() {
    let h = Harness::start().await;
    h.fake.clear_calls();

    let flow = h
        .cog
        .on_raw_reaction_add(&h.bot, &h.event("77", X))
        .await
        .unwrap();
    assert_eq!(flow, EventFlow::Stop);
    assert_eq!(
        h.fake.calls(),
        vec![Call::DeleteUserReaction {
            message_id: h.root.clone(),
            emoji: X.into(),
            user_id: "77".into(),
        }]
    );
    assert!(h.root_message().is_some());
}

#[tokio::test]
async fn bot_and_dm_reactions_are_ignored() {
    let h = Harness::start().await;
    h.fake.clear_calls();

    let own = h.event(crate::testing::BOT_ID, X);
    assert_eq!(
        h.cog.on_raw_reaction_add(&h.bot, &own).await.unwrap(),
        EventFlow::Continue
    );
    let mut dm = h.event(OWNER_ID, X);
    dm.guild_id = None;
    assert_eq!(
        h.cog.on_raw_reaction_add(&h.bot, &dm).await.unwrap(),
        EventFlow::Continue
    );
    assert!(h.fake.calls().is_empty());
}

#[tokio::test]
async fn clicks_while_busy_are_dropped() {
    let h = Harness::start().await;
    let handle = h.cog.sessions().get(&h.root).unwrap();
    let _busy = handle.state.lock().await;
    h.fake.clear_calls();

    assert_eq!(h.click(FILE_FOLDER).await, EventFlow::Stop);
    assert_eq!(h.fake.calls().len(), 1);
    assert!(h.root_message().is_some());
}

#[tokio::test]
async fn deleting_the_root_ends_a_pending_prompt() {
    let h = Harness::start().await;
    let click = h.spawn_click(h.event(OWNER_ID, PENCIL));
    h.wait_for_prompt().await;

    let delete = MessageDelete {
        id: h.root.clone(),
        channel_id: COMPOSE.into(),
        guild_id: Some(GUILD.into()),
    };
    h.cog.on_message_delete(&h.bot, &delete).await.unwrap();

    assert_eq!(click.await.unwrap().unwrap(), EventFlow::Stop);
    assert!(h.cog.sessions().is_empty());
    // The prompt was removed after the wait ended.
    assert!(h.bot_messages().is_empty());
}

#[tokio::test]
async fn cancel_during_a_pending_prompt_closes_the_dialog() {
    let h = Harness::start().await;
    h.click_and_reply(PENCIL, "draft", vec![]).await;
    let preview = h.session().await.preview.unwrap();

    let click = h.spawn_click(h.event(OWNER_ID, PENCIL));
    h.wait_for_prompt().await;
    assert_eq!(h.click(X).await, EventFlow::Stop);

    assert_eq!(click.await.unwrap().unwrap(), EventFlow::Stop);
    assert!(h.root_message().is_none());
    assert!(h.fake.message(COMPOSE, &preview).is_none());
    assert!(h.cog.sessions().is_empty());
    assert!(!h.bot.waiters.is_waiting(COMPOSE, OWNER_ID));
    assert!(h.bot_messages().is_empty());
}

#[tokio::test]
async fn deleting_one_root_keeps_another_dialogs_prompt() {
    let h = Harness::start().await;
    let command = h.fake.user_message(COMPOSE, &h.author, ".test <#30>", vec![]);
    let ctx = Context::parse(command, &[".".to_string()]).unwrap();
    h.cog.on_command(&h.bot, &ctx).await.unwrap();
    let other_root = h
        .fake
        .messages_in(COMPOSE)
        .into_iter()
        .find(|m| {
            m.id != h.root
                && m.embeds.first().and_then(|e| e.title.as_deref()) == Some(COMPOSE_MESSAGE)
        })
        .unwrap()
        .id;

    let mut event = h.event(OWNER_ID, PENCIL);
    event.message_id = other_root.clone();
    let click = h.spawn_click(event);
    h.wait_for_prompt().await;

    let delete = MessageDelete {
        id: h.root.clone(),
        channel_id: COMPOSE.into(),
        guild_id: Some(GUILD.into()),
    };
    h.cog.on_message_delete(&h.bot, &delete).await.unwrap();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(h.bot.waiters.is_waiting(COMPOSE, OWNER_ID));

    let reply = h.fake.user_message(COMPOSE, &h.author, "still here", vec![]);
    reply_when_waiting(&h.bot.waiters, reply).await;
    assert_eq!(click.await.unwrap().unwrap(), EventFlow::Stop);

    let other = h.cog.sessions().get(&other_root).unwrap();
    assert_eq!(other.state.lock().await.draft.content, "still here");
    assert_eq!(h.cog.sessions().len(), 1);
}

#[tokio::test]
async fn test_command_validates_the_channel() {
    let fake = FakeDiscord::new();
    fake.add_text_channel(GUILD, COMPOSE);
    fake.add_text_channel("99", "40");
    let (bot, _) = bot_context(&fake);
    let cog = MessagesCog::new();
    let author = user(OWNER_ID, "owner");

    let run = |content: &str| {
        let message = fake.user_message(COMPOSE, &author, content, vec![]);
        Context::parse(message, &[".".to_string()]).unwrap()
    };

    let err = cog.on_command(&bot, &run(".test")).await.unwrap_err();
    assert!(matches!(err, CommandError::MissingArgument("channel")));
    let err = cog.on_command(&bot, &run(".test general")).await.unwrap_err();
    assert!(matches!(err, CommandError::BadArgument(_)));
    let err = cog.on_command(&bot, &run(".test <#555>")).await.unwrap_err();
    assert!(matches!(err, CommandError::BadArgument(_)));
    let err = cog.on_command(&bot, &run(".test <#40>")).await.unwrap_err();
    assert!(matches!(err, CommandError::BadArgument(_)));
    assert!(cog.sessions().is_empty());
}
