//! Proactive suggestions, calendar scanning and workflow automation.

pub mod error;
pub mod proactive;
pub mod scheduler;
pub mod services;
pub mod slot;
pub mod workflow;

pub use error::ActionError;
pub use proactive::ProactiveEngine;
pub use scheduler::CalendarScheduler;
pub use services::{CalendarService, CalendarSuggestionGenerator};
pub use slot::SuggestionSlot;
pub use workflow::WorkflowEngine;
