//! Top-level error for the composed application.

use kwararru_action::ActionError;
use kwararru_call::CallError;
use kwararru_chat::ChatError;
use kwararru_core::error::KwararruError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] KwararruError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Action(#[from] ActionError),
}
