use anyhow::Result;
use std::future::Future;
use teloxide::prelude::*;
use teloxide::types::FileId;

use crate::config::CONFIG;
use crate::llm::media::{download_media, read_local_blob, BlobReader, EncodeError, ImageBlob};

pub async fn get_file_url(bot: &Bot, file_id: &FileId) -> Result<String> {
    let file = bot.get_file(file_id.clone()).await?;
    Ok(format!(
        "https://api.telegram.org/file/bot{}/{}",
        CONFIG.bot_token, file.path
    ))
}

/// Downloads Telegram attachments on demand; other blobs are read locally.
#[derive(Clone)]
pub struct TelegramBlobReader {
    bot: Bot,
}

impl TelegramBlobReader {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn read_blob(&self, blob: &ImageBlob) -> Result<Vec<u8>, EncodeError> {
        let ImageBlob::Telegram { file_id, .. } = blob else {
            return read_local_blob(blob).await;
        };

        let url = get_file_url(&self.bot, file_id)
            .await
            .map_err(|err| EncodeError::Download(err.to_string()))?;
        download_media(&url)
            .await
            .ok_or_else(|| EncodeError::Download(format!("telegram file {}", file_id.0)))
    }
}

impl BlobReader for TelegramBlobReader {
    fn read(&self, blob: &ImageBlob) -> impl Future<Output = Result<Vec<u8>, EncodeError>> + Send {
        self.read_blob(blob)
    }
}
