//! System assistant panel: a help conversation kept apart from the modes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use kwararru_core::types::{Message, MessageIdGenerator, MessageStatus};

use crate::error::ChatError;
use crate::reply::AssistantResponder;

pub const WELCOME_MESSAGE: &str = "Welcome to Webzero! I'm your system assistant. How can I help you navigate the application today? For example, you can ask 'How do I check the news?' or 'How can I practice for a test?'.";

pub struct AssistantPanel {
    messages: Mutex<Vec<Message>>,
    ids: MessageIdGenerator,
    responder: Arc<dyn AssistantResponder>,
    minimized: AtomicBool,
}

impl AssistantPanel {
    /// New panel, minimized, seeded with the welcome message.
    pub fn new(responder: Arc<dyn AssistantResponder>) -> Self {
        let ids = MessageIdGenerator::new();
        let mut welcome = Message::bot(ids.next_id(), WELCOME_MESSAGE);
        welcome.status = MessageStatus::Read;
        Self {
            messages: Mutex::new(vec![welcome]),
            ids,
            responder,
            minimized: AtomicBool::new(true),
        }
    }

    fn push(&self, message: Message) -> Result<(), ChatError> {
        self.messages
            .lock()
            .map_err(|e| ChatError::Storage(format!("assistant lock poisoned: {}", e)))?
            .push(message);
        Ok(())
    }

    pub fn messages(&self) -> Result<Vec<Message>, ChatError> {
        Ok(self
            .messages
            .lock()
            .map_err(|e| ChatError::Storage(format!("assistant lock poisoned: {}", e)))?
            .clone())
    }

    /// Ask the assistant. Returns the bot reply that was appended.
    pub async fn send(&self, text: &str) -> Result<Message, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let mut question = Message::user(self.ids.next_id(), text);
        question.status = MessageStatus::Read;
        self.push(question)?;

        let answer = self.responder.get_assistant_response(text).await.map_err(|e| {
            warn!(error = %e, "Assistant response failed");
            ChatError::from(e)
        })?;

        let mut reply = Message::bot(self.ids.next_id(), answer);
        reply.status = MessageStatus::Read;
        self.push(reply.clone())?;
        Ok(reply)
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized.load(Ordering::SeqCst)
    }

    pub fn set_minimized(&self, minimized: bool) {
        self.minimized.store(minimized, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kwararru_core::error::KwararruError;
    use kwararru_core::types::Sender;

    struct Canned;

    #[async_trait]
    impl AssistantResponder for Canned {
        async fn get_assistant_response(&self, text: &str) -> Result<String, KwararruError> {
            if text.contains("news") {
                Ok("Open News mode from the dashboard.".into())
            } else {
                Err(KwararruError::Upstream("offline".into()))
            }
        }
    }

    #[test]
    fn test_panel_starts_with_welcome() {
        let panel = AssistantPanel::new(Arc::new(Canned));
        let messages = panel.messages().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, WELCOME_MESSAGE);
        assert_eq!(messages[0].sender, Sender::Bot);
        assert!(panel.is_minimized());
    }

    #[tokio::test]
    async fn test_send_appends_question_and_answer() {
        let panel = AssistantPanel::new(Arc::new(Canned));
        let reply = panel.send("How do I check the news?").await.unwrap();
        assert_eq!(reply.text, "Open News mode from the dashboard.");

        let messages = panel.messages().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].sender, Sender::User);
        assert!(messages[2].id > messages[1].id);
    }

    #[tokio::test]
    async fn test_send_failure_keeps_question() {
        let panel = AssistantPanel::new(Arc::new(Canned));
        assert!(matches!(
            panel.send("help").await,
            Err(ChatError::Reply(_))
        ));
        assert_eq!(panel.messages().unwrap().len(), 2);
        assert!(matches!(panel.send(" ").await, Err(ChatError::EmptyMessage)));
    }

    #[test]
    fn test_minimize_toggle() {
        let panel = AssistantPanel::new(Arc::new(Canned));
        panel.set_minimized(false);
        assert!(!panel.is_minimized());
    }
}
