//! Proactive trigger engine.
//!
//! Holds the three single-occupancy suggestion slots (mode suggestion,
//! calendar suggestion, proactive action), the cached calendar events, and
//! the accept/dismiss flows that turn a suggestion into a conversation turn.
//!
//! Any change to the cached events or to a suggestion slot requests an
//! immediate calendar re-check from the scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use kwararru_chat::Conversation;
use kwararru_core::config::ProactiveConfig;
use kwararru_core::events::DomainEvent;
use kwararru_core::types::{
    CalendarEvent, MessageId, NewCalendarEvent, ProactiveAction, ProactiveCalendarSuggestion,
    ProactiveSuggestion, Timestamp,
};

use crate::error::ActionError;
use crate::services::{CalendarService, CalendarSuggestionGenerator};
use crate::slot::SuggestionSlot;

pub const EVENT_ADDED_NOTICE: &str = "Event added to calendar.";
pub const EVENT_ADD_FAILED_NOTICE: &str = "Failed to add event.";
pub const EVENT_REMOVED_NOTICE: &str = "Event removed from calendar.";
pub const EVENT_REMOVE_FAILED_NOTICE: &str = "Failed to remove event.";

/// Resets the in-flight flag when a calendar check finishes.
struct CheckGuard<'a>(&'a AtomicBool);

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ProactiveEngine {
    conversation: Conversation,
    calendar: Option<Arc<dyn CalendarService>>,
    suggester: Option<Arc<dyn CalendarSuggestionGenerator>>,
    calendar_events: Mutex<Vec<CalendarEvent>>,
    suggestion: SuggestionSlot<ProactiveSuggestion>,
    calendar_suggestion: SuggestionSlot<ProactiveCalendarSuggestion>,
    action: SuggestionSlot<ProactiveAction>,
    checking: AtomicBool,
    recheck: Notify,
    lookahead: Duration,
}

impl std::fmt::Debug for ProactiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProactiveEngine")
            .field("lookahead", &self.lookahead)
            .field("suggestion", &self.suggestion.is_live())
            .field("calendar_suggestion", &self.calendar_suggestion.is_live())
            .field("action", &self.action.is_live())
            .finish()
    }
}

impl ProactiveEngine {
    pub fn new(conversation: Conversation, config: &ProactiveConfig) -> Self {
        Self {
            conversation,
            calendar: None,
            suggester: None,
            calendar_events: Mutex::new(Vec::new()),
            suggestion: SuggestionSlot::new(),
            calendar_suggestion: SuggestionSlot::new(),
            action: SuggestionSlot::new(),
            checking: AtomicBool::new(false),
            recheck: Notify::new(),
            lookahead: config.calendar_lookahead(),
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarService>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn with_suggestion_generator(
        mut self,
        suggester: Arc<dyn CalendarSuggestionGenerator>,
    ) -> Self {
        self.suggester = Some(suggester);
        self
    }

    fn events_cache(&self) -> MutexGuard<'_, Vec<CalendarEvent>> {
        self.calendar_events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: DomainEvent) {
        self.conversation.events().publish(event);
    }

    fn request_recheck(&self) {
        self.recheck.notify_one();
    }

    /// Resolves once events or suggestions have changed since the last call.
    pub async fn recheck_requested(&self) {
        self.recheck.notified().await;
    }

    // =========================================================================
    // Calendar
    // =========================================================================

    pub fn calendar_events(&self) -> Vec<CalendarEvent> {
        self.events_cache().clone()
    }

    pub fn set_calendar_events(&self, events: Vec<CalendarEvent>) {
        *self.events_cache() = events;
        self.request_recheck();
    }

    /// Reload the cached events from the calendar service.
    pub async fn refresh_events(&self) -> Result<Vec<CalendarEvent>, ActionError> {
        let calendar = self.calendar.clone().ok_or(ActionError::CalendarUnavailable)?;
        let events = calendar.get_upcoming_events().await?;
        debug!(count = events.len(), "Calendar events loaded");
        self.set_calendar_events(events.clone());
        Ok(events)
    }

    pub async fn add_event(&self, event: NewCalendarEvent) -> Result<CalendarEvent, ActionError> {
        let result = match self.calendar.clone() {
            Some(calendar) => calendar.add_calendar_event(event).await.map_err(ActionError::from),
            None => Err(ActionError::CalendarUnavailable),
        };
        match result {
            Ok(created) => {
                self.events_cache().push(created.clone());
                self.request_recheck();
                self.conversation.notify(EVENT_ADDED_NOTICE);
                Ok(created)
            }
            Err(e) => {
                warn!(error = %e, "Failed to add calendar event");
                self.conversation.notify(EVENT_ADD_FAILED_NOTICE);
                Err(e)
            }
        }
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<(), ActionError> {
        let result = match self.calendar.clone() {
            Some(calendar) => calendar
                .delete_calendar_event(event_id)
                .await
                .map_err(ActionError::from),
            None => Err(ActionError::CalendarUnavailable),
        };
        match result {
            Ok(()) => {
                self.events_cache().retain(|e| e.id != event_id);
                self.request_recheck();
                self.conversation.notify(EVENT_REMOVED_NOTICE);
                Ok(())
            }
            Err(e) => {
                warn!(event_id, error = %e, "Failed to remove calendar event");
                self.conversation.notify(EVENT_REMOVE_FAILED_NOTICE);
                Err(e)
            }
        }
    }

    /// Earliest cached event starting after `now` and within the lookahead.
    pub fn next_upcoming(&self, now: Timestamp) -> Option<CalendarEvent> {
        let window = i64::try_from(self.lookahead.as_millis()).unwrap_or(i64::MAX);
        self.events_cache()
            .iter()
            .filter(|e| e.start_time > now.0 && e.start_time - now.0 < window)
            .min_by_key(|e| e.start_time)
            .cloned()
    }

    fn any_suggestion_live(&self) -> bool {
        self.suggestion.is_live() || self.calendar_suggestion.is_live()
    }

    /// Publish a calendar suggestion for the next upcoming event, unless a
    /// suggestion is already live or another check is in flight.
    ///
    /// Returns whether a suggestion was published.
    pub async fn check_calendar(&self, now: Timestamp) -> Result<bool, ActionError> {
        if self.any_suggestion_live() {
            return Ok(false);
        }
        if self.checking.swap(true, Ordering::SeqCst) {
            debug!("Calendar check already in flight");
            return Ok(false);
        }
        let _guard = CheckGuard(&self.checking);

        let Some(event) = self.next_upcoming(now) else {
            return Ok(false);
        };
        let Some(suggester) = self.suggester.clone() else {
            return Ok(false);
        };

        let text = suggester
            .generate_calendar_suggestion(&event)
            .await
            .map_err(|e| ActionError::Suggestion(e.to_string()))?;

        // A suggestion may have gone live while we were waiting.
        if self.any_suggestion_live() {
            return Ok(false);
        }

        let event_id = event.id.clone();
        let published = self.calendar_suggestion.try_publish(ProactiveCalendarSuggestion {
            suggestion_text: text,
            source_event: event,
        });
        if published {
            info!(event_id = %event_id, "Calendar suggestion published");
            self.publish(DomainEvent::CalendarSuggestionPublished {
                event_id,
                timestamp: Timestamp::now(),
            });
        }
        Ok(published)
    }

    pub fn calendar_suggestion(&self) -> Option<ProactiveCalendarSuggestion> {
        self.calendar_suggestion.get()
    }

    /// Send the suggestion text as a user turn in the current mode.
    pub async fn accept_calendar_suggestion(&self) -> Result<Option<MessageId>, ActionError> {
        let Some(suggestion) = self.calendar_suggestion.take() else {
            return Ok(None);
        };
        self.publish(DomainEvent::CalendarSuggestionCleared {
            timestamp: Timestamp::now(),
        });
        self.request_recheck();
        let id = self
            .conversation
            .send_message(&suggestion.suggestion_text, false)
            .await?;
        Ok(Some(id))
    }

    pub fn dismiss_calendar_suggestion(&self) -> bool {
        let dismissed = self.calendar_suggestion.take().is_some();
        if dismissed {
            self.publish(DomainEvent::CalendarSuggestionCleared {
                timestamp: Timestamp::now(),
            });
            self.request_recheck();
        }
        dismissed
    }

    // =========================================================================
    // Mode suggestion
    // =========================================================================

    pub fn publish_suggestion(&self, suggestion: ProactiveSuggestion) {
        let target_mode = suggestion.target_mode;
        self.suggestion.replace(suggestion);
        debug!(mode = %target_mode, "Mode suggestion published");
        self.publish(DomainEvent::SuggestionPublished {
            target_mode,
            timestamp: Timestamp::now(),
        });
        self.request_recheck();
    }

    pub fn suggestion(&self) -> Option<ProactiveSuggestion> {
        self.suggestion.get()
    }

    /// Switch to the suggested mode and send its prompt as a first turn there.
    pub async fn accept_suggestion(&self) -> Result<Option<MessageId>, ActionError> {
        let Some(suggestion) = self.suggestion.take() else {
            return Ok(None);
        };
        self.publish(DomainEvent::SuggestionCleared {
            timestamp: Timestamp::now(),
        });
        self.request_recheck();

        let target = suggestion.target_mode;
        self.conversation.set_mode(target);
        let id = self
            .conversation
            .sender_for(target)
            .send(&suggestion.initial_prompt, true)
            .await?;
        Ok(Some(id))
    }

    pub fn dismiss_suggestion(&self) -> bool {
        let dismissed = self.suggestion.take().is_some();
        if dismissed {
            self.publish(DomainEvent::SuggestionCleared {
                timestamp: Timestamp::now(),
            });
            self.request_recheck();
        }
        dismissed
    }

    // =========================================================================
    // Proactive action
    // =========================================================================

    pub fn publish_action(&self, action: ProactiveAction) {
        let target_mode = action.target_mode;
        self.action.replace(action);
        self.publish(DomainEvent::ProactiveActionPublished {
            target_mode,
            timestamp: Timestamp::now(),
        });
    }

    pub fn proactive_action(&self) -> Option<ProactiveAction> {
        self.action.get()
    }

    /// Switch to the target mode and append the prepared content there.
    pub fn accept_action(&self) -> Result<Option<MessageId>, ActionError> {
        let Some(action) = self.action.take() else {
            return Ok(None);
        };
        self.conversation.set_mode(action.target_mode);
        let id = self
            .conversation
            .store()
            .append(action.target_mode, action.generated_content)?;
        self.publish(DomainEvent::ProactiveActionCleared {
            timestamp: Timestamp::now(),
        });
        Ok(Some(id))
    }

    pub fn dismiss_action(&self) -> bool {
        let dismissed = self.action.take().is_some();
        if dismissed {
            self.publish(DomainEvent::ProactiveActionCleared {
                timestamp: Timestamp::now(),
            });
        }
        dismissed
    }
}
