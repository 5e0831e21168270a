//! Call-end handling: call history and meeting reports.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{info, warn};

use kwararru_call::{CallEndHandler, CallTranscript};
use kwararru_chat::{Conversation, Turn};
use kwararru_core::types::{CallRecord, Mode};
use kwararru_storage::PersistedState;

pub const MEETING_REPORT_PROMPT: &str = "Please generate a meeting report.";
pub const MEETING_TOO_SHORT_NOTICE: &str =
    "Meeting ended. Not enough conversation to generate a report.";

/// Records every finished call and, in meeting mode, asks for a report.
pub struct MeetingReportHandler {
    conversation: Conversation,
    persisted: PersistedState,
    history: Mutex<Vec<CallRecord>>,
}

impl MeetingReportHandler {
    pub fn new(conversation: Conversation, persisted: PersistedState) -> Self {
        let history = persisted.call_history();
        Self {
            conversation,
            persisted,
            history: Mutex::new(history),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CallRecord>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn history(&self) -> Vec<CallRecord> {
        self.lock().clone()
    }

    fn record(&self, record: CallRecord) {
        let mut history = self.lock();
        history.push(record);
        self.persisted.save_call_history(&history);
    }
}

#[async_trait]
impl CallEndHandler for MeetingReportHandler {
    async fn on_call_end(&self, transcript: CallTranscript, record: CallRecord) {
        self.record(record);

        if self.conversation.mode() != Mode::Meeting {
            return;
        }
        if transcript.polished.trim().is_empty() {
            self.conversation.notify(MEETING_TOO_SHORT_NOTICE);
            return;
        }

        let is_first_turn = self
            .conversation
            .store()
            .messages(Mode::Meeting)
            .map(|messages| messages.is_empty())
            .unwrap_or(false);
        let turn = Turn::new(MEETING_REPORT_PROMPT)
            .first_turn(is_first_turn)
            .with_transcript(transcript.polished);

        info!(speakers = transcript.speaker_names.len(), "Requesting meeting report");
        if let Err(e) = self.conversation.sender_for(Mode::Meeting).submit(turn).await {
            warn!(error = %e, "Meeting report request failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwararru_chat::{ReplyGenerator, ReplyRequest, SessionStore};
    use kwararru_core::error::KwararruError;
    use kwararru_core::events::{DomainEvent, EventBus};
    use kwararru_core::types::{CallKind, Persona, Timestamp};
    use kwararru_storage::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn record() -> CallRecord {
        CallRecord {
            id: Uuid::new_v4(),
            kind: CallKind::Live,
            persona: Persona::AgentZero,
            started_at: Timestamp(1_000),
            ended_at: Timestamp(61_000),
            duration_secs: 60.0,
        }
    }

    struct TranscriptReplies {
        seen: Mutex<Vec<ReplyRequest>>,
    }

    #[async_trait]
    impl ReplyGenerator for TranscriptReplies {
        async fn generate_reply(&self, request: ReplyRequest) -> Result<String, KwararruError> {
            self.seen.lock().unwrap().push(request);
            Ok("## Meeting report".into())
        }
    }

    fn handler(
        replies: Option<Arc<dyn ReplyGenerator>>,
    ) -> (MeetingReportHandler, Conversation, PersistedState) {
        let store = SessionStore::new(Duration::from_millis(20), EventBus::default());
        let conversation = Conversation::new(store, replies, 8000);
        let persisted = PersistedState::new(Arc::new(MemoryStore::new()));
        (
            MeetingReportHandler::new(conversation.clone(), persisted.clone()),
            conversation,
            persisted,
        )
    }

    #[tokio::test]
    async fn test_history_recorded_outside_meeting_mode() {
        let (handler, conversation, persisted) = handler(None);
        handler
            .on_call_end(CallTranscript::default(), record())
            .await;

        assert_eq!(handler.history().len(), 1);
        assert_eq!(persisted.call_history().len(), 1);
        assert_eq!(conversation.store().snapshot().unwrap().total_messages(), 0);
    }

    #[tokio::test]
    async fn test_meeting_report_requested_with_transcript() {
        let replies = Arc::new(TranscriptReplies {
            seen: Mutex::new(Vec::new()),
        });
        let (handler, conversation, _) = handler(Some(replies.clone()));
        conversation.set_mode(Mode::Meeting);

        handler
            .on_call_end(
                CallTranscript {
                    polished: "Ada: ship on Friday.".into(),
                    ..Default::default()
                },
                record(),
            )
            .await;

        let messages = conversation.store().messages(Mode::Meeting).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, MEETING_REPORT_PROMPT);
        assert_eq!(messages[1].text, "## Meeting report");

        let seen = replies.seen.lock().unwrap();
        assert_eq!(seen[0].transcript.as_deref(), Some("Ada: ship on Friday."));
        assert!(seen[0].is_first_turn);
    }

    #[tokio::test]
    async fn test_empty_meeting_transcript_notice() {
        let (handler, conversation, _) = handler(None);
        conversation.set_mode(Mode::Meeting);
        let mut rx = conversation.events().subscribe();

        handler
            .on_call_end(
                CallTranscript {
                    polished: "   ".into(),
                    ..Default::default()
                },
                record(),
            )
            .await;

        assert!(conversation.store().messages(Mode::Meeting).unwrap().is_empty());
        let notices: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                DomainEvent::Notice { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(notices, vec![MEETING_TOO_SHORT_NOTICE.to_string()]);
    }
}
