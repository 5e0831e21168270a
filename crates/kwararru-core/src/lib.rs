pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::KwararruConfig;
pub use error::{KwararruError, Result};
pub use events::{DomainEvent, EventBus};
pub use types::*;
