use std::fmt::Display;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use teloxide::types::Message;
use tracing::info;

#[derive(Debug)]
pub struct CommandTimer {
    command: String,
    chat_id: i64,
    user_id: Option<i64>,
    message_id: i64,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl CommandTimer {
    /// Starts in the "error" status so that an early exit through `?` is not
    /// logged as a success.
    fn new(command: &str, chat_id: i64, user_id: Option<i64>, message_id: i64) -> Self {
        CommandTimer {
            command: command.to_string(),
            chat_id,
            user_id,
            message_id,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "error".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn from_message(command: &str, message: &Message) -> Self {
        Self::new(
            command,
            message.chat.id.0,
            message.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()),
            i64::from(message.id.0),
        )
    }

    pub fn log_received(&self) {
        info!(
            target: "bot.timing",
            "event=command_received command={} chat_id={} user_id={:?} message_id={} received_at={}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339()
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "bot.timing",
            "event=command_completed command={} chat_id={} user_id={:?} message_id={} started_at={} response_sent_at={} duration_s={:.3} status={} detail={}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_command_timer(command: &str, message: &Message) -> CommandTimer {
    let timer = CommandTimer::from_message(command, message);
    timer.log_received();
    timer
}

pub fn complete_command_timer(timer: &mut CommandTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    E: Display,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "bot.timing",
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = match &result {
        Ok(_) => "success".to_string(),
        Err(err) => format!("error ({err})"),
    };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "bot.timing",
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfinished_timer_reports_error() {
        let mut timer = CommandTimer::new("decode", 1, None, 2);
        assert_eq!(timer.status, "error");
        timer.log_completed();
        assert!(timer.completed);
        assert_eq!(timer.status, "error");
    }

    #[test]
    fn completed_timer_keeps_explicit_status() {
        let mut timer = CommandTimer::new("decode", 1, Some(3), 2);
        complete_command_timer(&mut timer, "success", None);
        assert_eq!(timer.status, "success");
        assert!(timer.completed);
    }

    #[tokio::test]
    async fn llm_timing_passes_result_through() {
        let ok: Result<u8, String> =
            log_llm_timing("gemini", "m", "decode", None, || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        let err: Result<u8, String> =
            log_llm_timing("gemini", "m", "decode", None, || async { Err("boom".to_string()) })
                .await;
        assert_eq!(err, Err("boom".to_string()));
    }
}
