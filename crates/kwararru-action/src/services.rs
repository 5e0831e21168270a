//! Calendar collaborators.

use async_trait::async_trait;

use kwararru_core::error::KwararruError;
use kwararru_core::types::{CalendarEvent, NewCalendarEvent};

#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn get_upcoming_events(&self) -> Result<Vec<CalendarEvent>, KwararruError>;

    /// Store `event` and return it with its assigned id.
    async fn add_calendar_event(
        &self,
        event: NewCalendarEvent,
    ) -> Result<CalendarEvent, KwararruError>;

    async fn delete_calendar_event(&self, event_id: &str) -> Result<(), KwararruError>;
}

/// Writes the text offered to the user ahead of an upcoming event.
#[async_trait]
pub trait CalendarSuggestionGenerator: Send + Sync {
    async fn generate_calendar_suggestion(
        &self,
        event: &CalendarEvent,
    ) -> Result<String, KwararruError>;
}
