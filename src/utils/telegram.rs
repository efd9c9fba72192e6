use std::time::{Duration, Instant};

use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Telegram shows a chat action for about five seconds.
const TYPING_REFRESH_INTERVAL: Duration = Duration::from_secs(4);

/// Keeps "typing…" visible while an analysis runs. The indicator stops when
/// the guard is dropped or after `max_duration`, whichever comes first.
pub struct TypingIndicator {
    chat_id: ChatId,
    started: Instant,
    task_handle: Option<JoinHandle<()>>,
}

impl Drop for TypingIndicator {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
        debug!(
            "Typing indicator for chat {} stopped after {:.1}s",
            self.chat_id.0,
            self.started.elapsed().as_secs_f64()
        );
    }
}

fn refresh_count(max_duration: Duration) -> u32 {
    let ticks = max_duration.as_millis() / TYPING_REFRESH_INTERVAL.as_millis();
    u32::try_from(ticks).unwrap_or(u32::MAX).max(1)
}

pub fn start_typing_indicator(bot: Bot, chat_id: ChatId, max_duration: Duration) -> TypingIndicator {
    let refreshes = refresh_count(max_duration);
    let task_handle = tokio::spawn(async move {
        for _ in 0..refreshes {
            if let Err(err) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
                warn!("send_chat_action failed for chat {}: {err}", chat_id.0);
            }
            tokio::time::sleep(TYPING_REFRESH_INTERVAL).await;
        }
    });

    TypingIndicator {
        chat_id,
        started: Instant::now(),
        task_handle: Some(task_handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refreshes_cover_the_request_timeout() {
        assert_eq!(refresh_count(Duration::from_secs(90)), 22);
        assert_eq!(refresh_count(Duration::from_secs(1)), 1);
    }
}
