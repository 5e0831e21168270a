//! Conversation engine for Kwararru.
//!
//! Owns per-mode message history (`SessionStore`), the active mode, view and
//! persona (`Conversation`), the send pathway every user turn travels
//! through (`TurnSender`), share-link encoding, and the assistant panel.

pub mod assistant;
pub mod error;
pub mod orchestrator;
pub mod reply;
pub mod session;
pub mod share;

pub use assistant::AssistantPanel;
pub use error::ChatError;
pub use orchestrator::{
    ChatStats, Conversation, ExportedLog, MessageAction, SearchFilter, Turn, TurnSender,
};
pub use reply::{AssistantResponder, ReplyGenerator, ReplyRequest};
pub use session::{ChangeHook, SessionStore};
pub use share::SharedSessionState;
