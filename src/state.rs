use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::handlers::input::InputDraft;
use crate::llm::{Analyzer, GeminiService};
use crate::session::{Phase, SessionMachine};

/// Everything one chat owns: the form being filled in and the phase it is in.
#[derive(Debug, Default)]
pub struct ChatSession {
    pub draft: InputDraft,
    pub machine: SessionMachine,
}

impl ChatSession {
    /// Idle with nothing drafted, indistinguishable from a fresh session.
    pub fn is_vacant(&self) -> bool {
        self.machine.phase() == Phase::Idle && self.draft.is_empty()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer<GeminiService>>,
    pub sessions: Arc<Mutex<HashMap<i64, ChatSession>>>,
}

impl AppState {
    pub fn new(analyzer: Analyzer<GeminiService>) -> Self {
        AppState {
            analyzer: Arc::new(analyzer),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `f` against the chat's session, creating it on first use and
    /// dropping it again once it is vacant. The lock is released before
    /// returning, so `f` must not await.
    pub fn with_session<T>(&self, chat_id: i64, f: impl FnOnce(&mut ChatSession) -> T) -> T {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(chat_id).or_default();
        let output = f(session);
        if session.is_vacant() {
            sessions.remove(&chat_id);
            debug!("Dropped vacant session for chat {}", chat_id);
        }
        output
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::analysis::tests::sample_result;
    use crate::llm::media::{ImageBlob, ImagePreview};

    pub(crate) fn offline_state() -> AppState {
        AppState::new(Analyzer::new(
            GeminiService::new("http://127.0.0.1:9", "", Duration::from_secs(1)),
            "gemini-2.5-flash",
            0.7,
            "permissive",
        ))
    }

    #[test]
    fn untouched_chat_leaves_no_session() {
        let state = offline_state();
        let phase = state.with_session(1, |session| session.machine.phase());
        assert_eq!(phase, Phase::Idle);
        assert_eq!(state.session_count(), 0);
    }

    #[test]
    fn drafted_chat_is_kept_until_cleared() {
        let state = offline_state();
        state.with_session(1, |session| {
            session.draft.attach_image(ImagePreview::new(
                ImageBlob::Memory {
                    bytes: vec![1],
                    mime_type: None,
                },
                "img",
            ));
        });
        assert_eq!(state.session_count(), 1);

        state.with_session(1, |session| session.draft.clear_image());
        assert_eq!(state.session_count(), 0);
    }

    #[test]
    fn finished_chat_is_dropped_after_reset() {
        let state = offline_state();
        state.with_session(7, |session| {
            session.draft.set_text("minimalism");
            let input = session.draft.take_input();
            session.machine.submit(input).unwrap();
        });
        assert_eq!(state.session_count(), 1);

        state.with_session(7, |session| session.machine.succeed(sample_result()).unwrap());
        assert_eq!(state.session_count(), 1);

        state.with_session(7, |session| session.machine.reset().unwrap());
        assert_eq!(state.session_count(), 0);
    }
}
