//! Error types for the conversation engine.

use kwararru_core::error::KwararruError;
use kwararru_core::types::MessageId;

/// Errors from the session store and the send pathway.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
    #[error("reply error: {0}")]
    Reply(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<KwararruError> for ChatError {
    fn from(err: KwararruError) -> Self {
        match err {
            KwararruError::Upstream(msg) => ChatError::Reply(msg),
            KwararruError::Serialization(msg) => ChatError::Serialization(msg),
            other => ChatError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(err.to_string())
    }
}
