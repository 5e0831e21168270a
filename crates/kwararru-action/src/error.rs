//! Error types for the proactive and workflow engines.

use kwararru_chat::ChatError;
use kwararru_core::error::KwararruError;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),
    #[error("Calendar service failed: {0}")]
    Calendar(String),
    #[error("Calendar service is not configured")]
    CalendarUnavailable,
    #[error("Suggestion generation failed: {0}")]
    Suggestion(String),
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<KwararruError> for ActionError {
    fn from(err: KwararruError) -> Self {
        match err {
            KwararruError::Upstream(msg) => ActionError::Calendar(msg),
            other => ActionError::Storage(other.to_string()),
        }
    }
}
