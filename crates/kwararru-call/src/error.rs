//! Error types for the call coordinator.

use kwararru_core::error::KwararruError;
use kwararru_core::types::CallState;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("invalid call transition: {from} -> {to}")]
    InvalidTransition { from: CallState, to: CallState },
    #[error("a call can only end in idle or standby, not {0}")]
    InvalidEndTarget(CallState),
    #[error("no news briefing was produced")]
    EmptyScript,
    #[error("broadcast generation failed: {0}")]
    Generation(String),
    #[error("broadcast services are not configured")]
    ServicesUnavailable,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<KwararruError> for CallError {
    fn from(err: KwararruError) -> Self {
        match err {
            KwararruError::Upstream(msg) => CallError::Generation(msg),
            other => CallError::Storage(other.to_string()),
        }
    }
}
