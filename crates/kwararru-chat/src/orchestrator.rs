//! Conversation orchestrator: active mode, view and persona plus the
//! message-send pathway.
//!
//! Every user turn, whether typed, accepted from a suggestion or synthesized
//! by a workflow, goes through a [`TurnSender`] bound to one mode.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use kwararru_core::events::{DomainEvent, EventBus};
use kwararru_core::types::{
    Attachment, Message, MessageId, MessageStatus, Mode, Persona, Sender, Timestamp, View,
    WhiteboardElement,
};

use crate::error::ChatError;
use crate::reply::{ReplyGenerator, ReplyRequest};
use crate::session::SessionStore;
use crate::share::SharedSessionState;

const REPLY_FAILED_NOTICE: &str = "Sorry, I couldn't get a response. Please try again.";
pub const MESSAGE_COPIED_NOTICE: &str = "Message copied to clipboard.";

/// Canned follow-ups offered on a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageAction {
    Summarize,
    Explain,
    Eli5,
    TeachBack,
}

impl MessageAction {
    /// The prompt sent on the user's behalf for `text`.
    pub fn prompt(&self, text: &str) -> String {
        match self {
            MessageAction::Summarize => format!(
                "Please provide a concise summary of the following text:\n\n---\n{}\n---",
                text
            ),
            MessageAction::Explain => format!(
                "Please explain the following text in a different way, as if for a beginner:\n\n---\n{}\n---",
                text
            ),
            MessageAction::Eli5 => format!(
                "Explain the following text like I'm 5 years old:\n\n---\n{}\n\n---",
                text
            ),
            MessageAction::TeachBack => format!(
                "(SYSTEM: The user wants to try the 'Teach Back' method. Your role is now to act as a student. \
                 The user will explain the following concept to you. Your task is to listen to their explanation, \
                 then provide constructive feedback, ask clarifying questions, and point out any inaccuracies.)\
                 \n\n---CONCEPT---\n{}\n\n(Start your response by inviting the user to explain the concept to you, \
                 for example: \"Okay, I'm ready to learn. Please explain that concept to me as if I'm new to the topic.\")",
                text
            ),
        }
    }
}

/// Narrows a history search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SearchFilter {
    #[default]
    All,
    Starred,
    Images,
    Voice,
}

impl SearchFilter {
    fn matches(&self, message: &Message) -> bool {
        match self {
            SearchFilter::All => true,
            SearchFilter::Starred => message.starred,
            SearchFilter::Images => message.has_image(),
            SearchFilter::Voice => message.has_audio(),
        }
    }
}

#[derive(Debug)]
struct ConversationState {
    mode: Mode,
    view: View,
    persona: Persona,
    whiteboard: Vec<WhiteboardElement>,
}

struct Inner {
    store: SessionStore,
    state: Mutex<ConversationState>,
    replies: Option<Arc<dyn ReplyGenerator>>,
    events: EventBus,
    max_message_length: usize,
}

/// Cheaply cloneable handle onto the conversation.
#[derive(Clone)]
pub struct Conversation {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("mode", &self.mode())
            .field("view", &self.view())
            .finish()
    }
}

/// Derived counters over every mode's history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub bot_messages: usize,
    pub image_messages: usize,
    pub voice_messages: usize,
    pub starred_messages: usize,
}

/// A mode's history rendered for download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedLog {
    pub file_name: String,
    pub json: String,
}

impl Conversation {
    pub fn new(
        store: SessionStore,
        replies: Option<Arc<dyn ReplyGenerator>>,
        max_message_length: usize,
    ) -> Self {
        let events = store.events().clone();
        Self {
            inner: Arc::new(Inner {
                store,
                state: Mutex::new(ConversationState {
                    mode: Mode::Default,
                    view: View::Dashboard,
                    persona: Persona::default(),
                    whiteboard: Vec::new(),
                }),
                replies,
                events,
                max_message_length,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ConversationState> {
        // Plain values only, so a poisoned guard is still consistent.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Publish a transient user-facing notice.
    pub fn notify(&self, text: impl Into<String>) {
        self.inner.events.notice(text);
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn mode(&self) -> Mode {
        self.state().mode
    }

    /// Switch the active mode. Returns `false` if it was already active.
    ///
    /// While the chat view is showing, the switch is also announced as a
    /// notice.
    pub fn set_mode(&self, mode: Mode) -> bool {
        let (from, in_chat) = {
            let mut state = self.state();
            if state.mode == mode {
                return false;
            }
            (std::mem::replace(&mut state.mode, mode), state.view == View::Chat)
        };
        info!(from = %from, to = %mode, "Mode changed");
        self.inner.events.publish(DomainEvent::ModeChanged {
            from,
            to: mode,
            timestamp: Timestamp::now(),
        });
        if in_chat {
            self.notify(format!("Switched to {} mode.", mode.label()));
        }
        true
    }

    pub fn view(&self) -> View {
        self.state().view
    }

    pub fn set_view(&self, view: View) {
        {
            let mut state = self.state();
            if state.view == view {
                return;
            }
            state.view = view;
        }
        self.inner.events.publish(DomainEvent::ViewChanged {
            view,
            timestamp: Timestamp::now(),
        });
    }

    pub fn persona(&self) -> Persona {
        self.state().persona
    }

    /// Returns `false` if `persona` was already active.
    pub fn set_persona(&self, persona: Persona) -> bool {
        {
            let mut state = self.state();
            if state.persona == persona {
                return false;
            }
            state.persona = persona;
        }
        info!(persona = %persona, "Persona changed");
        self.inner.events.publish(DomainEvent::PersonaChanged {
            persona,
            timestamp: Timestamp::now(),
        });
        true
    }

    /// Switch to `mode` and show the chat view.
    pub fn jump_to_message_context(&self, mode: Mode) {
        self.set_mode(mode);
        self.set_view(View::Chat);
    }

    // =========================================================================
    // Whiteboard
    // =========================================================================

    pub fn whiteboard(&self) -> Vec<WhiteboardElement> {
        self.state().whiteboard.clone()
    }

    pub fn add_whiteboard_element(&self, element: WhiteboardElement) {
        self.state().whiteboard.push(element);
    }

    pub fn set_whiteboard(&self, elements: Vec<WhiteboardElement>) {
        self.state().whiteboard = elements;
    }

    pub fn clear_whiteboard(&self) {
        self.state().whiteboard.clear();
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// A send pathway bound to `mode`, independent of the active mode.
    pub fn sender_for(&self, mode: Mode) -> TurnSender {
        TurnSender {
            conversation: self.clone(),
            mode,
        }
    }

    /// Send `text` as a user turn in the active mode.
    pub async fn send_message(&self, text: &str, is_first_turn: bool) -> Result<MessageId, ChatError> {
        self.sender_for(self.mode()).send(text, is_first_turn).await
    }

    /// Send a suggested prompt as a follow-up turn in the active mode.
    pub async fn suggestion_click(&self, prompt: &str) -> Result<MessageId, ChatError> {
        self.send_message(prompt, false).await
    }

    /// Send the canned `action` prompt built around `text`.
    pub async fn message_action(
        &self,
        action: MessageAction,
        text: &str,
    ) -> Result<MessageId, ChatError> {
        debug!(?action, "Message action");
        self.send_message(&action.prompt(text), false).await
    }

    /// Append an empty bot message to the active mode for streamed output.
    pub fn begin_bot_message(&self) -> Result<MessageId, ChatError> {
        let store = self.store();
        let mut message = Message::bot(store.next_id(), "");
        message.status = MessageStatus::Sending;
        store.append(self.mode(), message)
    }

    /// Stream a chunk into message `id` of the active mode.
    pub fn append_text_chunk(&self, id: MessageId, chunk: &str) -> Result<bool, ChatError> {
        self.store().append_text_chunk(self.mode(), id, chunk)
    }

    /// Mark a streamed bot message as complete.
    pub fn finish_bot_message(&self, id: MessageId) -> Result<(), ChatError> {
        self.store()
            .update_by_id(id, |m| m.status = MessageStatus::Sent)?;
        Ok(())
    }

    pub fn update_message_text(&self, id: MessageId, text: &str) -> Result<(), ChatError> {
        self.store().update_text(id, text)
    }

    // =========================================================================
    // Message actions
    // =========================================================================

    pub fn delete_message(&self, id: MessageId) -> Result<(), ChatError> {
        self.store().remove(self.mode(), id)
    }

    pub fn star_message(&self, id: MessageId) -> Result<bool, ChatError> {
        self.store().toggle_star(id)
    }

    pub fn add_reaction(&self, id: MessageId, emoji: &str) -> Result<(), ChatError> {
        self.store().add_reaction(id, emoji)
    }

    /// Text of message `id` for the clipboard.
    pub fn copy_message(&self, id: MessageId) -> Result<String, ChatError> {
        let message = self.store().get(id)?.ok_or(ChatError::MessageNotFound(id))?;
        self.notify(MESSAGE_COPIED_NOTICE);
        Ok(message.text)
    }

    /// Messages of the active mode containing `query` (case-insensitive)
    /// that pass `filter`. An empty query matches everything.
    pub fn search(&self, query: &str, filter: SearchFilter) -> Result<Vec<Message>, ChatError> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .store()
            .messages(self.mode())?
            .into_iter()
            .filter(|m| filter.matches(m))
            .filter(|m| needle.is_empty() || m.text.to_lowercase().contains(&needle))
            .collect())
    }

    /// Empty the active mode. Confirmation is the caller's business.
    pub fn clear_chat(&self) -> Result<(), ChatError> {
        self.store().clear(self.mode())?;
        self.notify("Chat log purged.");
        Ok(())
    }

    /// Render the active mode's history as pretty JSON.
    pub fn export_chat(&self) -> Result<ExportedLog, ChatError> {
        let mode = self.mode();
        let messages = self.store().messages(mode)?;
        let json = serde_json::to_string_pretty(&messages)?;
        let file_name = format!(
            "kwararru_log_{}_{}.json",
            mode,
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ")
        );
        self.notify("Chat log exported.");
        Ok(ExportedLog { file_name, json })
    }

    pub fn complete_quiz(&self, correct: u32, incorrect: u32) -> Result<MessageId, ChatError> {
        let total = correct + incorrect;
        self.append_system(format!("Quiz finished! Your score: {}/{}.", correct, total))
    }

    pub fn complete_debate(&self) -> Result<MessageId, ChatError> {
        self.append_system("The debate has concluded.".to_string())
    }

    fn append_system(&self, text: String) -> Result<MessageId, ChatError> {
        let store = self.store();
        store.append(self.mode(), Message::system(store.next_id(), text))
    }

    pub fn stats(&self) -> Result<ChatStats, ChatError> {
        let sessions = self.store().snapshot()?;
        let mut stats = ChatStats::default();
        for message in sessions.all_messages() {
            stats.total_messages += 1;
            match message.sender {
                Sender::User => stats.user_messages += 1,
                Sender::Bot => stats.bot_messages += 1,
                Sender::System => {}
            }
            if message.has_image() {
                stats.image_messages += 1;
            }
            if message.has_audio() {
                stats.voice_messages += 1;
            }
            if message.starred {
                stats.starred_messages += 1;
            }
        }
        Ok(stats)
    }

    // =========================================================================
    // Sharing
    // =========================================================================

    pub fn snapshot(&self) -> Result<SharedSessionState, ChatError> {
        let chat_sessions = self.store().snapshot()?;
        let state = self.state();
        Ok(SharedSessionState {
            chat_sessions,
            whiteboard_elements: state.whiteboard.clone(),
            ai_mode: state.mode,
            persona: state.persona,
        })
    }

    /// Load a shared snapshot in place of the current conversation.
    pub fn restore(&self, shared: SharedSessionState) -> Result<(), ChatError> {
        self.store().restore(shared.chat_sessions)?;
        self.set_mode(shared.ai_mode);
        self.set_persona(shared.persona);
        self.set_whiteboard(shared.whiteboard_elements);
        Ok(())
    }
}

/// Optional extras for a user turn.
#[derive(Clone, Debug, Default)]
pub struct Turn {
    pub text: String,
    pub attachment: Option<Attachment>,
    pub is_first_turn: bool,
    pub transcript: Option<String>,
}

impl Turn {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn first_turn(mut self, is_first_turn: bool) -> Self {
        self.is_first_turn = is_first_turn;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }
}

/// The send pathway, bound to one mode at construction.
#[derive(Clone, Debug)]
pub struct TurnSender {
    conversation: Conversation,
    mode: Mode,
}

impl TurnSender {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub async fn send(&self, text: &str, is_first_turn: bool) -> Result<MessageId, ChatError> {
        self.submit(Turn::new(text).first_turn(is_first_turn)).await
    }

    /// Append the user turn, then ask the reply generator (if any) and append
    /// its answer to the same mode. Returns the user message id.
    pub async fn submit(&self, turn: Turn) -> Result<MessageId, ChatError> {
        let inner = &self.conversation.inner;
        if turn.text.trim().is_empty() && turn.attachment.is_none() {
            return Err(ChatError::EmptyMessage);
        }
        if turn.text.chars().count() > inner.max_message_length {
            return Err(ChatError::MessageTooLong(inner.max_message_length));
        }

        let store = &inner.store;
        let mut message = Message::user(store.next_id(), turn.text.clone());
        message.attachment = turn.attachment.clone();
        let id = store.append(self.mode, message)?;

        debug!(mode = %self.mode, message_id = id, first_turn = turn.is_first_turn, "User turn submitted");
        inner.events.publish(DomainEvent::TurnSubmitted {
            mode: self.mode,
            message_id: id,
            is_first_turn: turn.is_first_turn,
            timestamp: Timestamp::now(),
        });

        let Some(replies) = inner.replies.clone() else {
            return Ok(id);
        };

        let request = ReplyRequest {
            mode: self.mode,
            persona: self.conversation.persona(),
            text: turn.text,
            attachment: turn.attachment,
            history: store.messages(self.mode)?,
            is_first_turn: turn.is_first_turn,
            transcript: turn.transcript,
        };

        match replies.generate_reply(request).await {
            Ok(reply) => {
                store.append(self.mode, Message::bot(store.next_id(), reply))?;
                Ok(id)
            }
            Err(e) => {
                warn!(mode = %self.mode, error = %e, "Reply generation failed");
                self.conversation.notify(REPLY_FAILED_NOTICE);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kwararru_core::error::KwararruError;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct EchoReplies {
        seen: StdMutex<Vec<ReplyRequest>>,
    }

    #[async_trait]
    impl ReplyGenerator for EchoReplies {
        async fn generate_reply(&self, request: ReplyRequest) -> Result<String, KwararruError> {
            let reply = format!("echo: {}", request.text);
            self.seen.lock().unwrap().push(request);
            Ok(reply)
        }
    }

    struct FailingReplies;

    #[async_trait]
    impl ReplyGenerator for FailingReplies {
        async fn generate_reply(&self, _request: ReplyRequest) -> Result<String, KwararruError> {
            Err(KwararruError::Upstream("quota exhausted".into()))
        }
    }

    fn conversation(replies: Option<Arc<dyn ReplyGenerator>>) -> Conversation {
        let store = SessionStore::new(Duration::from_millis(20), EventBus::default());
        Conversation::new(store, replies, 8000)
    }

    fn drain_notices(rx: &mut tokio::sync::broadcast::Receiver<DomainEvent>) -> Vec<String> {
        let mut notices = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::Notice { text, .. } = event {
                notices.push(text);
            }
        }
        notices
    }

    #[test]
    fn test_set_mode_emits_once() {
        let convo = conversation(None);
        let mut rx = convo.events().subscribe();
        assert!(convo.set_mode(Mode::Quiz));
        assert!(!convo.set_mode(Mode::Quiz));
        assert_eq!(convo.mode(), Mode::Quiz);

        let changes: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, DomainEvent::ModeChanged { .. }))
            .collect();
        assert_eq!(changes.len(), 1);
    }

    #[tokio::test]
    async fn test_send_appends_user_and_bot_turns() {
        let replies = Arc::new(EchoReplies {
            seen: StdMutex::new(Vec::new()),
        });
        let convo = conversation(Some(replies.clone()));
        convo.set_persona(Persona::AgentZara);

        let id = convo.send_message("hello", true).await.unwrap();
        let messages = convo.store().messages(Mode::Default).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, id);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Bot);
        assert_eq!(messages[1].text, "echo: hello");

        let seen = replies.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_first_turn);
        assert_eq!(seen[0].persona, Persona::AgentZara);
        assert_eq!(seen[0].history.len(), 1);
    }

    #[tokio::test]
    async fn test_sender_is_bound_to_its_mode() {
        let convo = conversation(None);
        let sender = convo.sender_for(Mode::News);
        convo.set_mode(Mode::Debate);

        sender.send("elections", true).await.unwrap();
        assert_eq!(convo.store().messages(Mode::News).unwrap().len(), 1);
        assert!(convo.store().messages(Mode::Debate).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_validation() {
        let convo = conversation(None);
        assert!(matches!(
            convo.send_message("   ", false).await,
            Err(ChatError::EmptyMessage)
        ));
        let long = "x".repeat(8001);
        assert!(matches!(
            convo.send_message(&long, false).await,
            Err(ChatError::MessageTooLong(8000))
        ));
        assert!(convo.store().messages(Mode::Default).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attachment_only_turn_is_accepted() {
        let convo = conversation(None);
        let turn = Turn::new("").with_attachment(Attachment::Audio { data: "AAA".into() });
        convo.sender_for(Mode::Default).submit(turn).await.unwrap();
        assert_eq!(convo.stats().unwrap().voice_messages, 1);
    }

    #[tokio::test]
    async fn test_reply_failure_notifies_and_keeps_user_turn() {
        let convo = conversation(Some(Arc::new(FailingReplies)));
        let mut rx = convo.events().subscribe();

        let result = convo.send_message("are you there?", false).await;
        assert!(matches!(result, Err(ChatError::Reply(_))));
        assert_eq!(convo.store().messages(Mode::Default).unwrap().len(), 1);
        assert_eq!(drain_notices(&mut rx), vec![REPLY_FAILED_NOTICE.to_string()]);
    }

    #[test]
    fn test_streaming_follows_active_mode() {
        let convo = conversation(None);
        convo.set_mode(Mode::News);
        let id = convo.begin_bot_message().unwrap();
        assert!(convo.append_text_chunk(id, "Breaking").unwrap());

        convo.set_mode(Mode::Default);
        assert!(!convo.append_text_chunk(id, " news").unwrap());

        let message = convo.store().get(id).unwrap().unwrap();
        assert_eq!(message.text, "Breaking");
        assert_eq!(message.status, MessageStatus::Sending);

        convo.finish_bot_message(id).unwrap();
        assert_eq!(
            convo.store().get(id).unwrap().unwrap().status,
            MessageStatus::Sent
        );
    }

    #[test]
    fn test_update_message_text_scans_all_modes() {
        let convo = conversation(None);
        convo.set_mode(Mode::Meeting);
        let id = convo.begin_bot_message().unwrap();
        convo.set_mode(Mode::Default);

        convo.update_message_text(id, "Minutes").unwrap();
        assert_eq!(convo.store().get(id).unwrap().unwrap().text, "Minutes");
    }

    #[test]
    fn test_clear_chat_notice() {
        let convo = conversation(None);
        let mut rx = convo.events().subscribe();
        convo.complete_debate().unwrap();
        convo.clear_chat().unwrap();
        assert!(convo.store().messages(Mode::Default).unwrap().is_empty());
        assert_eq!(drain_notices(&mut rx), vec!["Chat log purged.".to_string()]);
    }

    #[test]
    fn test_export_chat() {
        let convo = conversation(None);
        convo.set_mode(Mode::Quiz);
        convo.complete_quiz(7, 3).unwrap();

        let log = convo.export_chat().unwrap();
        assert!(log.file_name.starts_with("kwararru_log_quiz_"));
        assert!(log.file_name.ends_with(".json"));
        let parsed: Vec<Message> = serde_json::from_str(&log.json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].text, "Quiz finished! Your score: 7/10.");
        assert_eq!(parsed[0].sender, Sender::System);
    }

    #[test]
    fn test_jump_to_message_context() {
        let convo = conversation(None);
        convo.jump_to_message_context(Mode::Translator);
        assert_eq!(convo.mode(), Mode::Translator);
        assert_eq!(convo.view(), View::Chat);
    }

    #[tokio::test]
    async fn test_stats() {
        let convo = conversation(Some(Arc::new(EchoReplies {
            seen: StdMutex::new(Vec::new()),
        })));
        let id = convo.send_message("one", true).await.unwrap();
        convo.star_message(id).unwrap();
        convo.complete_debate().unwrap();
        let image = Turn::new("look").with_attachment(Attachment::Image {
            data: "iVBOR".into(),
            mime_type: "image/png".into(),
        });
        convo.sender_for(Mode::News).submit(image).await.unwrap();

        let stats = convo.stats().unwrap();
        assert_eq!(stats.total_messages, 5);
        assert_eq!(stats.user_messages, 2);
        assert_eq!(stats.bot_messages, 2);
        assert_eq!(stats.image_messages, 1);
        assert_eq!(stats.starred_messages, 1);
    }

    #[test]
    fn test_mode_change_announced_only_in_chat_view() {
        let convo = conversation(None);
        let mut rx = convo.events().subscribe();
        convo.set_mode(Mode::Quiz);
        assert!(drain_notices(&mut rx).is_empty());

        convo.set_view(View::Chat);
        convo.set_mode(Mode::Debate);
        convo.set_mode(Mode::Debate);
        assert_eq!(drain_notices(&mut rx), vec!["Switched to Debate mode.".to_string()]);
    }

    #[tokio::test]
    async fn test_message_action_sends_prompt() {
        let replies = Arc::new(EchoReplies {
            seen: StdMutex::new(Vec::new()),
        });
        let convo = conversation(Some(replies.clone()));
        convo.set_mode(Mode::News);

        convo
            .message_action(MessageAction::Eli5, "Inflation eased to 21%.")
            .await
            .unwrap();
        let messages = convo.store().messages(Mode::News).unwrap();
        assert_eq!(
            messages[0].text,
            "Explain the following text like I'm 5 years old:\n\n---\nInflation eased to 21%.\n\n---"
        );
        let seen = replies.seen.lock().unwrap();
        assert!(!seen[0].is_first_turn);
    }

    #[test]
    fn test_message_action_prompts() {
        let summary = MessageAction::Summarize.prompt("abc");
        assert!(summary.starts_with("Please provide a concise summary"));
        assert!(summary.ends_with("---\nabc\n---"));
        assert!(MessageAction::Explain.prompt("abc").contains("as if for a beginner"));

        let teach = MessageAction::TeachBack.prompt("photosynthesis");
        assert!(teach.starts_with("(SYSTEM: The user wants to try the 'Teach Back' method."));
        assert!(teach.contains("---CONCEPT---\nphotosynthesis\n\n"));
        assert!(!teach.contains("  "));
    }

    #[tokio::test]
    async fn test_suggestion_click_is_follow_up_turn() {
        let replies = Arc::new(EchoReplies {
            seen: StdMutex::new(Vec::new()),
        });
        let convo = conversation(Some(replies.clone()));
        convo.suggestion_click("Tell me more").await.unwrap();

        let messages = convo.store().messages(Mode::Default).unwrap();
        assert_eq!(messages[0].text, "Tell me more");
        assert_eq!(messages[1].text, "echo: Tell me more");
        assert!(!replies.seen.lock().unwrap()[0].is_first_turn);
    }

    #[tokio::test]
    async fn test_copy_message_notice() {
        let convo = conversation(None);
        let id = convo.send_message("copy me", false).await.unwrap();
        let mut rx = convo.events().subscribe();

        assert_eq!(convo.copy_message(id).unwrap(), "copy me");
        assert!(matches!(
            convo.copy_message(id + 99),
            Err(ChatError::MessageNotFound(_))
        ));
        assert_eq!(drain_notices(&mut rx), vec![MESSAGE_COPIED_NOTICE.to_string()]);
    }

    #[tokio::test]
    async fn test_search_by_text_and_filter() {
        let convo = conversation(None);
        let starred = convo.send_message("Lagos traffic update", false).await.unwrap();
        convo.send_message("Abuja weather", false).await.unwrap();
        convo.star_message(starred).unwrap();
        convo.sender_for(Mode::News).send("Lagos elsewhere", false).await.unwrap();

        let hits = convo.search("LAGOS", SearchFilter::All).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, starred);

        assert_eq!(convo.search("", SearchFilter::All).unwrap().len(), 2);
        assert_eq!(convo.search("", SearchFilter::Starred).unwrap().len(), 1);
        assert!(convo.search("abuja", SearchFilter::Starred).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_and_restore() {
        let source = conversation(None);
        source.set_mode(Mode::Debate);
        source.set_persona(Persona::AgentZara);
        source.add_whiteboard_element(serde_json::json!({"type": "circle"}));
        source.complete_debate().unwrap();
        let shared = source.snapshot().unwrap();

        let target = conversation(None);
        target.restore(shared.clone()).unwrap();
        assert_eq!(target.mode(), Mode::Debate);
        assert_eq!(target.persona(), Persona::AgentZara);
        assert_eq!(target.whiteboard().len(), 1);
        assert_eq!(target.snapshot().unwrap(), shared);
    }
}
