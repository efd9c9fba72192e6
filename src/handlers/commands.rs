use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, ReplyParameters,
};
use teloxide::RequestError;
use tracing::{info, warn};

use crate::analysis::UserInput;
use crate::config::{ANALYSIS_FAILED_MESSAGE, CONFIG};
use crate::handlers::input::{apply_message, DraftUpdate, InputDraft};
use crate::handlers::media::TelegramBlobReader;
use crate::render::{html_to_plain, render_html_sections, split_for_telegram};
use crate::session::{run_analysis, Phase, TransitionError};
use crate::state::AppState;
use crate::utils::telegram::start_typing_indicator;
use crate::utils::timing::{complete_command_timer, start_command_timer};

pub const CALLBACK_PREFIX: &str = "decode:";
const CALLBACK_SUBMIT: &str = "decode:submit";
const CALLBACK_CLEAR_IMAGE: &str = "decode:clear_image";
const CALLBACK_RESET: &str = "decode:reset";

const TELEGRAM_RETRY_ATTEMPTS: usize = 3;
const DRAFT_PREVIEW_CHARS: usize = 120;

const BUSY_MESSAGE: &str = "正在解构中，请等待当前结果。";
const EMPTY_DRAFT_MESSAGE: &str = "请先发送文字、图片或视频链接。";
const NEEDS_RESET_MESSAGE: &str = "上一次解读已完成，请先点击“重新开始”或发送 /reset。";
const ANALYZING_MESSAGE: &str = "<b>正在解构</b>\n<code>分析结构中...\n寻找第一性原理...\n提取情绪氛围...</code>";

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}

fn telegram_retryable_error(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_)
    )
}

async fn send_message_with_retry(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    parse_mode: Option<ParseMode>,
    keyboard: Option<InlineKeyboardMarkup>,
    reply_to: Option<MessageId>,
) -> Result<Message, RequestError> {
    let mut delay = Duration::from_secs_f32(1.5);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut request = bot.send_message(chat_id, text.to_string());
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }
        if let Some(keyboard) = keyboard.clone() {
            request = request.reply_markup(keyboard);
        }
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }
        match request.await {
            Ok(message) => return Ok(message),
            Err(err) => {
                if !telegram_retryable_error(&err) || attempt >= TELEGRAM_RETRY_ATTEMPTS {
                    return Err(err);
                }
                warn!("send_message attempt {} failed: {err}", attempt);
                if let RequestError::RetryAfter(wait) = err {
                    tokio::time::sleep(wait.duration()).await;
                } else {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

async fn edit_message_with_retry(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: &str,
    parse_mode: Option<ParseMode>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<(), RequestError> {
    let mut delay = Duration::from_secs_f32(1.5);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut request = bot.edit_message_text(chat_id, message_id, text.to_string());
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }
        if let Some(keyboard) = keyboard.clone() {
            request = request.reply_markup(keyboard);
        }
        match request.await {
            Ok(_) => return Ok(()),
            Err(err) => {
                if !telegram_retryable_error(&err) || attempt >= TELEGRAM_RETRY_ATTEMPTS {
                    return Err(err);
                }
                warn!("edit_message_text attempt {} failed: {err}", attempt);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

fn draft_keyboard(draft: &InputDraft) -> Option<InlineKeyboardMarkup> {
    let mut row = Vec::new();
    if draft.can_submit() {
        row.push(InlineKeyboardButton::callback("深度解读", CALLBACK_SUBMIT));
    }
    if draft.image().is_some() {
        row.push(InlineKeyboardButton::callback("清除图片", CALLBACK_CLEAR_IMAGE));
    }
    (!row.is_empty()).then(|| InlineKeyboardMarkup::new(vec![row]))
}

fn reset_keyboard(label: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        label.to_string(),
        CALLBACK_RESET,
    )]])
}

fn draft_summary(draft: &InputDraft, update: Option<&DraftUpdate>) -> String {
    let mut lines = Vec::new();
    if update.is_some_and(|update| update.image_replaced) {
        lines.push("已替换之前的图片。".to_string());
    }
    let text = draft.text();
    lines.push(format!(
        "核心概念：{}",
        if text.is_empty() {
            "（空）".to_string()
        } else {
            truncate_chars(text, DRAFT_PREVIEW_CHARS)
        }
    ));
    lines.push(format!(
        "视觉语境：{}",
        match draft.image() {
            Some(preview) => format!("已添加图片（{}）", preview.preview_ref()),
            None => "无".to_string(),
        }
    ));
    let link = draft.video_link();
    lines.push(format!(
        "视频链接：{}",
        if link.is_empty() { "无" } else { link }
    ));
    if !draft.can_submit() {
        lines.push(String::new());
        lines.push(EMPTY_DRAFT_MESSAGE.to_string());
    }
    lines.join("\n")
}

enum Intake {
    Updated(String, Option<InlineKeyboardMarkup>),
    Busy,
    Ignored,
}

/// Folds new content into the chat's draft. Content arriving after a
/// finished analysis starts a fresh form.
fn take_in(
    state: &AppState,
    chat_id: i64,
    apply: impl FnOnce(&mut InputDraft) -> DraftUpdate,
) -> Intake {
    state.with_session(chat_id, |session| {
        if session.machine.is_busy() {
            return Intake::Busy;
        }
        let update = apply(&mut session.draft);
        if update.is_empty() {
            return Intake::Ignored;
        }
        if matches!(session.machine.phase(), Phase::Result | Phase::Error) {
            if let Err(err) = session.machine.reset() {
                warn!("Implicit reset failed for chat {}: {}", chat_id, err);
            }
        }
        Intake::Updated(
            draft_summary(&session.draft, Some(&update)),
            draft_keyboard(&session.draft),
        )
    })
}

pub async fn content_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if !message.chat.is_private() {
        return Ok(());
    }

    match take_in(&state, message.chat.id.0, |draft| apply_message(draft, &message)) {
        Intake::Updated(summary, keyboard) => {
            send_message_with_retry(
                &bot,
                message.chat.id,
                &summary,
                None,
                keyboard,
                Some(message.id),
            )
            .await?;
        }
        Intake::Busy => {
            send_message_with_retry(&bot, message.chat.id, BUSY_MESSAGE, None, None, Some(message.id))
                .await?;
        }
        Intake::Ignored => {}
    }
    Ok(())
}

pub async fn decode_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    arg: Option<String>,
) -> Result<()> {
    let mut timer = start_command_timer("decode", &message);
    let chat_id = message.chat.id;

    let arg = arg.filter(|text| !text.trim().is_empty());
    if arg.is_some() || message.reply_to_message().is_some() {
        let intake = take_in(&state, chat_id.0, |draft| {
            let mut update = message
                .reply_to_message()
                .map(|reply| apply_message(draft, reply))
                .unwrap_or_default();
            if let Some(text) = arg.as_deref() {
                let own = draft.apply_text(text);
                update.text_changed |= own.text_changed;
                update.video_link_changed |= own.video_link_changed;
            }
            update
        });
        if let Intake::Busy = intake {
            send_message_with_retry(&bot, chat_id, BUSY_MESSAGE, None, None, Some(message.id))
                .await?;
            complete_command_timer(&mut timer, "rejected", Some("busy".to_string()));
            return Ok(());
        }
    }

    let status = start_analysis(&bot, &state, chat_id, Some(message.id)).await?;
    complete_command_timer(&mut timer, status, None);
    Ok(())
}

pub async fn clear_image_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let reply = clear_image(&state, message.chat.id.0);
    send_message_with_retry(&bot, message.chat.id, &reply.0, None, reply.1, Some(message.id))
        .await?;
    Ok(())
}

pub async fn reset_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let reply = reset_chat(&state, message.chat.id.0);
    send_message_with_retry(&bot, message.chat.id, reply, None, None, Some(message.id)).await?;
    Ok(())
}

fn clear_image(state: &AppState, chat_id: i64) -> (String, Option<InlineKeyboardMarkup>) {
    state.with_session(chat_id, |session| {
        if session.machine.is_busy() {
            return (BUSY_MESSAGE.to_string(), None);
        }
        let summary = if session.draft.clear_image() {
            format!("图片已清除。\n{}", draft_summary(&session.draft, None))
        } else {
            draft_summary(&session.draft, None)
        };
        (summary, draft_keyboard(&session.draft))
    })
}

fn reset_chat(state: &AppState, chat_id: i64) -> &'static str {
    state.with_session(chat_id, |session| {
        match session.machine.phase() {
            Phase::Analyzing => BUSY_MESSAGE,
            Phase::Idle => {
                session.draft = InputDraft::default();
                "已清空当前输入。"
            }
            Phase::Result | Phase::Error => match session.machine.reset() {
                Ok(()) => {
                    session.draft = InputDraft::default();
                    "已重置，请发送新的内容。"
                }
                Err(err) => {
                    warn!("Reset failed for chat {}: {}", chat_id, err);
                    BUSY_MESSAGE
                }
            },
        }
    })
}

/// Moves the draft into the state machine. The draft is left in place when
/// the chat is not idle.
fn claim_submission(state: &AppState, chat_id: i64) -> Result<Arc<UserInput>, TransitionError> {
    state.with_session(chat_id, |session| {
        if session.machine.phase() != Phase::Idle {
            return Err(TransitionError::Invalid {
                from: session.machine.phase(),
                event: "submit",
            });
        }
        if !session.draft.can_submit() {
            return Err(TransitionError::EmptyInput);
        }
        let input = session.draft.take_input();
        session.machine.submit(input)
    })
}

/// Drives one claimed analysis to its end.
/// Returns a short status label for timing logs.
async fn start_analysis(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
) -> Result<&'static str> {
    let input = match claim_submission(state, chat_id.0) {
        Ok(input) => input,
        Err(TransitionError::EmptyInput) => {
            send_message_with_retry(bot, chat_id, EMPTY_DRAFT_MESSAGE, None, None, reply_to)
                .await?;
            return Ok("empty");
        }
        Err(TransitionError::Invalid { from, .. }) => {
            let text = if from == Phase::Analyzing {
                BUSY_MESSAGE
            } else {
                NEEDS_RESET_MESSAGE
            };
            send_message_with_retry(bot, chat_id, text, None, None, reply_to).await?;
            return Ok("rejected");
        }
    };

    info!(
        "Chat {} entered {} (text_chars={}, image={}, video_link={}, active_sessions={})",
        chat_id.0,
        Phase::Analyzing,
        input.text.chars().count(),
        input.image.is_some(),
        !input.video_link.is_empty(),
        state.session_count()
    );

    let placeholder = send_message_with_retry(
        bot,
        chat_id,
        ANALYZING_MESSAGE,
        Some(ParseMode::Html),
        None,
        reply_to,
    )
    .await
    .map_err(|err| warn!("Failed to send analyzing placeholder: {err}"))
    .ok();

    let outcome = {
        let _typing = start_typing_indicator(
            bot.clone(),
            chat_id,
            Duration::from_secs(CONFIG.gemini_request_timeout_seconds),
        );
        let reader = TelegramBlobReader::new(bot.clone());
        run_analysis(&state.analyzer, &reader, &input).await
    };

    let resolved = state.with_session(chat_id.0, |session| {
        session
            .machine
            .resolve(outcome)
            .map(|phase| {
                let rendered = session
                    .machine
                    .result()
                    .zip(session.machine.input())
                    .map(|(result, input)| render_html_sections(result, input));
                (phase, rendered)
            })
    });

    let placeholder_id = placeholder.map(|message| message.id);
    match resolved {
        Ok((Phase::Result, Some(sections))) => {
            deliver_result(bot, chat_id, placeholder_id, &sections).await?;
            Ok("success")
        }
        Ok(_) => {
            show_error(bot, chat_id, placeholder_id).await?;
            Ok("error")
        }
        Err(err) => {
            warn!("Chat {} could not record analysis outcome: {}", chat_id.0, err);
            show_error(bot, chat_id, placeholder_id).await?;
            Ok("error")
        }
    }
}

async fn show_error(bot: &Bot, chat_id: ChatId, placeholder: Option<MessageId>) -> Result<()> {
    let text = format!("<b>系统错误</b>\n{}", ANALYSIS_FAILED_MESSAGE);
    let keyboard = Some(reset_keyboard("重试"));
    if let Some(message_id) = placeholder {
        if edit_message_with_retry(bot, chat_id, message_id, &text, Some(ParseMode::Html), keyboard.clone())
            .await
            .is_ok()
        {
            return Ok(());
        }
    }
    send_message_with_retry(bot, chat_id, &text, Some(ParseMode::Html), keyboard, None).await?;
    Ok(())
}

/// Sends the rendered result, replacing the placeholder with the first chunk.
/// A chunk Telegram rejects as markup is resent once as plain text.
async fn deliver_result(
    bot: &Bot,
    chat_id: ChatId,
    placeholder: Option<MessageId>,
    sections: &[String],
) -> Result<()> {
    let chunks = split_for_telegram(sections, CONFIG.telegram_max_length);
    let last = chunks.len().saturating_sub(1);
    for (index, chunk) in chunks.iter().enumerate() {
        let target = if index == 0 { placeholder } else { None };
        let keyboard = (index == last).then(|| reset_keyboard("重新开始"));
        if send_chunk(bot, chat_id, target, chunk, Some(ParseMode::Html), keyboard.clone())
            .await
            .is_ok()
        {
            continue;
        }
        warn!("Formatted chunk {} was rejected, sending plain text", index + 1);
        send_chunk(bot, chat_id, target, &html_to_plain(chunk), None, keyboard).await?;
    }
    Ok(())
}

async fn send_chunk(
    bot: &Bot,
    chat_id: ChatId,
    placeholder: Option<MessageId>,
    chunk: &str,
    parse_mode: Option<ParseMode>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<(), RequestError> {
    match placeholder {
        Some(message_id) => {
            edit_message_with_retry(bot, chat_id, message_id, chunk, parse_mode, keyboard).await
        }
        None => send_message_with_retry(bot, chat_id, chunk, parse_mode, keyboard, None)
            .await
            .map(|_| ()),
    }
}

pub async fn callback_handler(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    let Some(data) = query.data.clone() else {
        return Ok(());
    };
    let Some(message) = query.message.as_ref() else {
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return Ok(());
    };
    let chat_id = message.chat().id;

    match data.as_str() {
        CALLBACK_SUBMIT => {
            let busy = state.with_session(chat_id.0, |session| session.machine.is_busy());
            if busy {
                bot.answer_callback_query(query.id.clone())
                    .text(BUSY_MESSAGE)
                    .await?;
                return Ok(());
            }
            let _ = bot.answer_callback_query(query.id.clone()).await;
            start_analysis(&bot, &state, chat_id, None).await?;
        }
        CALLBACK_CLEAR_IMAGE => {
            let _ = bot.answer_callback_query(query.id.clone()).await;
            let (summary, keyboard) = clear_image(&state, chat_id.0);
            if edit_message_with_retry(&bot, chat_id, message.id(), &summary, None, keyboard.clone())
                .await
                .is_err()
            {
                send_message_with_retry(&bot, chat_id, &summary, None, keyboard, None).await?;
            }
        }
        CALLBACK_RESET => {
            let reply = reset_chat(&state, chat_id.0);
            bot.answer_callback_query(query.id.clone()).text(reply).await?;
            if reply != BUSY_MESSAGE {
                send_message_with_retry(&bot, chat_id, reply, None, None, None).await?;
            }
        }
        other => {
            warn!("Unknown callback data {}", other);
            let _ = bot.answer_callback_query(query.id.clone()).await;
        }
    }
    Ok(())
}

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(
        message.chat.id,
        "解构 DECODE · 多模态深度解读器\n\n发送文字、图片或视频链接，然后点击“深度解读”。使用 /help 查看全部命令。",
    )
    .reply_parameters(ReplyParameters::new(message.id))
    .await?;
    Ok(())
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    let help_text = "
<b>解构 DECODE 命令</b>

直接发送文字、图片（照片或图片文件）或视频链接即可填写输入，回复一张图片也会把它加入输入。

/decode - 开始深度解读
用法：<code>/decode [文字]</code>，或回复一条消息发送 <code>/decode</code>

/clearimage - 移除已添加的图片

/reset - 清空输入并回到初始状态

/help - 显示本帮助
";

    bot.send_message(message.chat.id, help_text)
        .reply_parameters(ReplyParameters::new(message.id))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sample_result;
    use crate::llm::media::{ImageBlob, ImagePreview};
    use crate::state::tests::offline_state;

    const CHAT: i64 = 42;

    fn draft_text(state: &AppState, text: &str) {
        state.with_session(CHAT, |session| session.draft.set_text(text));
    }

    fn phase(state: &AppState) -> Phase {
        state.with_session(CHAT, |session| session.machine.phase())
    }

    fn finished(state: &AppState) {
        draft_text(state, "minimalism");
        claim_submission(state, CHAT).unwrap();
        state.with_session(CHAT, |session| session.machine.succeed(sample_result()).unwrap());
    }

    #[test]
    fn submission_needs_content() {
        let state = offline_state();
        assert_eq!(
            claim_submission(&state, CHAT).unwrap_err(),
            TransitionError::EmptyInput
        );
        assert_eq!(phase(&state), Phase::Idle);
    }

    #[test]
    fn submission_moves_draft_into_machine() {
        let state = offline_state();
        draft_text(&state, "minimalism");
        let input = claim_submission(&state, CHAT).unwrap();
        assert_eq!(input.text, "minimalism");
        assert_eq!(phase(&state), Phase::Analyzing);
        assert!(state.with_session(CHAT, |session| session.draft.is_empty()));
    }

    #[test]
    fn second_submission_is_rejected_while_analyzing() {
        let state = offline_state();
        draft_text(&state, "first");
        claim_submission(&state, CHAT).unwrap();
        assert_eq!(
            claim_submission(&state, CHAT).unwrap_err(),
            TransitionError::Invalid {
                from: Phase::Analyzing,
                event: "submit"
            }
        );
    }

    #[test]
    fn submission_after_result_keeps_draft() {
        let state = offline_state();
        finished(&state);
        draft_text(&state, "next");
        let err = claim_submission(&state, CHAT).unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { from: Phase::Result, .. }));
        assert_eq!(state.with_session(CHAT, |session| session.draft.text().to_string()), "next");
    }

    #[test]
    fn content_after_result_resets_first() {
        let state = offline_state();
        finished(&state);
        let intake = take_in(&state, CHAT, |draft| draft.apply_text("new idea"));
        assert!(matches!(intake, Intake::Updated(..)));
        assert_eq!(phase(&state), Phase::Idle);
        assert_eq!(
            state.with_session(CHAT, |session| session.draft.text().to_string()),
            "new idea"
        );
    }

    #[test]
    fn content_after_error_resets_first() {
        let state = offline_state();
        draft_text(&state, "minimalism");
        claim_submission(&state, CHAT).unwrap();
        state.with_session(CHAT, |session| {
            session
                .machine
                .fail(&crate::analysis::AnalysisError::EmptyResponse)
                .unwrap()
        });
        take_in(&state, CHAT, |draft| draft.apply_text("again"));
        assert_eq!(phase(&state), Phase::Idle);
    }

    #[test]
    fn content_is_refused_while_analyzing() {
        let state = offline_state();
        draft_text(&state, "minimalism");
        claim_submission(&state, CHAT).unwrap();
        let intake = take_in(&state, CHAT, |draft| draft.apply_text("late"));
        assert!(matches!(intake, Intake::Busy));
        assert!(state.with_session(CHAT, |session| session.draft.is_empty()));
    }

    #[test]
    fn empty_update_is_ignored() {
        let state = offline_state();
        let intake = take_in(&state, CHAT, |_| DraftUpdate::default());
        assert!(matches!(intake, Intake::Ignored));
    }

    #[test]
    fn reset_and_clear_are_refused_while_analyzing() {
        let state = offline_state();
        draft_text(&state, "minimalism");
        claim_submission(&state, CHAT).unwrap();
        assert_eq!(reset_chat(&state, CHAT), BUSY_MESSAGE);
        let (reply, keyboard) = clear_image(&state, CHAT);
        assert_eq!(reply, BUSY_MESSAGE);
        assert!(keyboard.is_none());
        assert_eq!(phase(&state), Phase::Analyzing);
    }

    #[test]
    fn reset_in_idle_clears_draft() {
        let state = offline_state();
        draft_text(&state, "minimalism");
        assert_eq!(reset_chat(&state, CHAT), "已清空当前输入。");
        assert!(state.with_session(CHAT, |session| session.draft.is_empty()));
        assert_eq!(state.session_count(), 0);
    }

    #[test]
    fn reset_after_result_returns_to_idle() {
        let state = offline_state();
        finished(&state);
        assert_eq!(reset_chat(&state, CHAT), "已重置，请发送新的内容。");
        assert_eq!(phase(&state), Phase::Idle);
        assert!(state.with_session(CHAT, |session| session.machine.result().is_none()));
    }

    #[test]
    fn clearing_image_keeps_text() {
        let state = offline_state();
        draft_text(&state, "minimalism");
        state.with_session(CHAT, |session| {
            session.draft.attach_image(ImagePreview::new(
                ImageBlob::Memory {
                    bytes: vec![1],
                    mime_type: None,
                },
                "img",
            ))
        });
        let (reply, keyboard) = clear_image(&state, CHAT);
        assert!(reply.starts_with("图片已清除。"));
        assert_eq!(keyboard.unwrap().inline_keyboard[0].len(), 1);
        assert!(state.with_session(CHAT, |session| session.draft.image().is_none()));
    }

    #[test]
    fn keyboard_follows_submit_gate() {
        let mut draft = InputDraft::default();
        assert!(draft_keyboard(&draft).is_none());

        draft.set_text("minimalism");
        let keyboard = draft_keyboard(&draft).unwrap();
        assert_eq!(keyboard.inline_keyboard[0].len(), 1);

        draft.attach_image(ImagePreview::new(
            ImageBlob::Memory {
                bytes: vec![1],
                mime_type: None,
            },
            "img",
        ));
        let keyboard = draft_keyboard(&draft).unwrap();
        assert_eq!(keyboard.inline_keyboard[0].len(), 2);
    }

    #[test]
    fn summary_prompts_for_content_when_empty() {
        let summary = draft_summary(&InputDraft::default(), None);
        assert!(summary.contains(EMPTY_DRAFT_MESSAGE));
    }

    #[test]
    fn summary_names_attached_image() {
        let mut draft = InputDraft::default();
        draft.attach_image(ImagePreview::new(
            ImageBlob::Memory {
                bytes: vec![1],
                mime_type: None,
            },
            "photo.png",
        ));
        assert!(draft_summary(&draft, None).contains("已添加图片（photo.png）"));
    }

    #[test]
    fn summary_truncates_long_text() {
        let mut draft = InputDraft::default();
        draft.set_text(&"长".repeat(300));
        let summary = draft_summary(&draft, None);
        assert!(summary.contains('…'));
        assert!(!summary.contains(EMPTY_DRAFT_MESSAGE));
    }

    #[test]
    fn callback_data_shares_prefix() {
        for data in [CALLBACK_SUBMIT, CALLBACK_CLEAR_IMAGE, CALLBACK_RESET] {
            assert!(data.starts_with(CALLBACK_PREFIX));
        }
    }
}
