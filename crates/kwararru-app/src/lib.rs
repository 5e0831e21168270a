//! Kwararru application library.
//!
//! `KwararruApp` composes every subsystem over one event bus and one
//! persisted store. Hosts drive it through the subsystem handles it exposes
//! and render from the domain events it publishes.

pub mod app;
pub mod error;
pub mod launch;
pub mod logging;
pub mod meeting;

pub use app::{AppServices, KwararruApp};
pub use error::AppError;
pub use launch::Launch;
pub use logging::init_tracing;
pub use meeting::MeetingReportHandler;
