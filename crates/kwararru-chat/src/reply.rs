//! Collaborator seams for generating replies.

use async_trait::async_trait;

use kwararru_core::error::KwararruError;
use kwararru_core::types::{Attachment, Message, Mode, Persona};

/// Everything the reply generator gets to see for one user turn.
#[derive(Clone, Debug)]
pub struct ReplyRequest {
    pub mode: Mode,
    pub persona: Persona,
    pub text: String,
    pub attachment: Option<Attachment>,
    /// The mode's history, including the user turn just appended.
    pub history: Vec<Message>,
    pub is_first_turn: bool,
    /// Polished call transcript, present for meeting reports.
    pub transcript: Option<String>,
}

/// The AI completion service behind the send pathway.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(&self, request: ReplyRequest) -> Result<String, KwararruError>;
}

/// Answers questions in the system assistant panel.
#[async_trait]
pub trait AssistantResponder: Send + Sync {
    async fn get_assistant_response(&self, text: &str) -> Result<String, KwararruError>;
}
