//! Copy a rendered message back into something that can be re-sent.

use crate::api::DiscordApi;
use crate::error::HttpError;
use crate::types::{Attachment, Embed, Message, UploadFile};

/// Everything needed to post a copy of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub content: String,
    pub files: Vec<UploadFile>,
    pub embed: Option<Embed>,
}

/// Download an attachment into memory, keeping its name and spoiler flag.
pub async fn attachment_to_file<A: DiscordApi + ?Sized>(
    api: &A,
    attachment: &Attachment,
) -> Result<UploadFile, HttpError> {
    let data = api.download(&attachment.url).await?;
    Ok(UploadFile {
        filename: attachment.filename.clone(),
        data,
        spoiler: attachment.is_spoiler(),
    })
}

pub async fn get_files_from_message<A: DiscordApi + ?Sized>(
    api: &A,
    message: &Message,
) -> Result<Vec<UploadFile>, HttpError> {
    let mut files = Vec::with_capacity(message.attachments.len());
    for attachment in &message.attachments {
        files.push(attachment_to_file(api, attachment).await?);
    }
    Ok(files)
}

/// The text, files, and first rich embed of `message`.
pub async fn read_complete_message<A: DiscordApi + ?Sized>(
    api: &A,
    message: &Message,
) -> Result<MessageSnapshot, HttpError> {
    let embed = message.embeds.iter().find(|e| e.is_rich()).cloned();
    Ok(MessageSnapshot {
        content: message.content.clone(),
        files: get_files_from_message(api, message).await?,
        embed,
    })
}
