use teloxide::types::{Message, PhotoSize};

use crate::analysis::UserInput;
use crate::llm::media::{ImageBlob, ImagePreview};
use crate::utils::language::split_urls;

/// The chat's pending form: text, one image and one video link.
#[derive(Debug, Default)]
pub struct InputDraft {
    text: String,
    image: Option<ImagePreview>,
    video_link: String,
}

/// What a single chat message contributed to the draft.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DraftUpdate {
    pub text_changed: bool,
    pub image_attached: bool,
    pub image_replaced: bool,
    pub video_link_changed: bool,
}

impl DraftUpdate {
    pub fn is_empty(&self) -> bool {
        !self.text_changed && !self.image_attached && !self.video_link_changed
    }
}

impl InputDraft {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn image(&self) -> Option<&ImagePreview> {
        self.image.as_ref()
    }

    pub fn video_link(&self) -> &str {
        &self.video_link
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.image.is_none() && self.video_link.is_empty()
    }

    pub fn can_submit(&self) -> bool {
        !self.text.trim().is_empty() || self.image.is_some() || !self.video_link.trim().is_empty()
    }

    pub fn set_text(&mut self, text: &str) {
        self.text = text.trim().to_string();
    }

    pub fn set_video_link(&mut self, link: &str) {
        self.video_link = link.trim().to_string();
    }

    /// Returns true when an earlier preview was superseded and released.
    pub fn attach_image(&mut self, preview: ImagePreview) -> bool {
        self.image.replace(preview).is_some()
    }

    /// Returns true when there was an image to release.
    pub fn clear_image(&mut self) -> bool {
        self.image.take().is_some()
    }

    /// Applies free-form text: the first URL becomes the video link and the
    /// remaining prose, if any, becomes the text.
    pub fn apply_text(&mut self, raw: &str) -> DraftUpdate {
        let mut update = DraftUpdate::default();
        let (urls, prose) = split_urls(raw);
        if let Some(link) = urls.into_iter().find(|link| is_usable_link(link)) {
            self.set_video_link(&link);
            update.video_link_changed = true;
        }
        if !prose.is_empty() {
            self.set_text(&prose);
            update.text_changed = true;
        }
        update
    }

    pub fn take_input(&mut self) -> UserInput {
        let draft = std::mem::take(self);
        UserInput {
            text: draft.text,
            image: draft.image,
            video_link: draft.video_link,
        }
    }
}

fn is_usable_link(link: &str) -> bool {
    let candidate = if link.starts_with("www.") {
        format!("https://{link}")
    } else {
        link.to_string()
    };
    url::Url::parse(&candidate)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some())
        .unwrap_or(false)
}

fn largest_photo(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes.iter().max_by_key(|size| u64::from(size.width) * u64::from(size.height))
}

/// Photos, image documents and the photo of a replied-to message are the
/// three ways an image enters the draft.
pub fn image_from_message(message: &Message) -> Option<ImagePreview> {
    if let Some(photo) = message.photo().and_then(largest_photo) {
        return Some(ImagePreview::new(
            ImageBlob::Telegram {
                file_id: photo.file.id.clone(),
                mime_type: Some("image/jpeg".to_string()),
            },
            photo.file.unique_id.0.clone(),
        ));
    }

    if let Some(document) = message.document() {
        let mime = document.mime_type.as_ref().map(|mime| mime.essence_str().to_string());
        if mime.as_deref().is_some_and(|mime| mime.starts_with("image/")) {
            return Some(ImagePreview::new(
                ImageBlob::Telegram {
                    file_id: document.file.id.clone(),
                    mime_type: mime,
                },
                document.file.unique_id.0.clone(),
            ));
        }
    }

    None
}

pub fn image_from_reply(message: &Message) -> Option<ImagePreview> {
    message.reply_to_message().and_then(image_from_message)
}

/// Folds a content message into the draft.
pub fn apply_message(draft: &mut InputDraft, message: &Message) -> DraftUpdate {
    let mut update = message
        .text()
        .or_else(|| message.caption())
        .map(|text| draft.apply_text(text))
        .unwrap_or_default();

    if let Some(preview) = image_from_message(message).or_else(|| image_from_reply(message)) {
        update.image_replaced = draft.attach_image(preview);
        update.image_attached = true;
    }

    update
}
