use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{CallKind, CallState, Mode, MessageId, Persona, Timestamp, View};

/// All domain events that can occur in the Kwararru engine.
///
/// Events are emitted after state changes and consumed by:
/// - The UI collaborator (re-render, transient notices)
/// - Tests (observing side effects without polling)
/// - Cross-component listeners (persistence, analytics hooks)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DomainEvent {
    // =========================================================================
    // Session Events
    // =========================================================================
    /// A message was appended to a mode's history.
    MessageAppended {
        mode: Mode,
        message_id: MessageId,
        timestamp: Timestamp,
    },

    /// A message finished its deletion grace delay and was removed.
    MessageRemoved {
        mode: Mode,
        message_id: MessageId,
        timestamp: Timestamp,
    },

    /// A mode's history was replaced with an empty sequence.
    SessionCleared { mode: Mode, timestamp: Timestamp },

    /// A user turn was submitted through the send pathway.
    TurnSubmitted {
        mode: Mode,
        message_id: MessageId,
        is_first_turn: bool,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Navigation Events
    // =========================================================================
    ModeChanged {
        from: Mode,
        to: Mode,
        timestamp: Timestamp,
    },

    ViewChanged { view: View, timestamp: Timestamp },

    PersonaChanged {
        persona: Persona,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Call Events
    // =========================================================================
    CallStateChanged {
        from: CallState,
        to: CallState,
        timestamp: Timestamp,
    },

    /// An active call ended and a call record was produced.
    CallEnded {
        record_id: Uuid,
        kind: CallKind,
        duration_secs: f64,
        timestamp: Timestamp,
    },

    /// Broadcast script generation started (`true`) or finished (`false`).
    BroadcastGenerating { active: bool, timestamp: Timestamp },

    // =========================================================================
    // Proactive Events
    // =========================================================================
    SuggestionPublished {
        target_mode: Mode,
        timestamp: Timestamp,
    },

    SuggestionCleared { timestamp: Timestamp },

    CalendarSuggestionPublished {
        event_id: String,
        timestamp: Timestamp,
    },

    CalendarSuggestionCleared { timestamp: Timestamp },

    ProactiveActionPublished {
        target_mode: Mode,
        timestamp: Timestamp,
    },

    ProactiveActionCleared { timestamp: Timestamp },

    // =========================================================================
    // Workflow Events
    // =========================================================================
    WorkflowRun {
        workflow_id: String,
        name: String,
        timestamp: Timestamp,
    },

    // =========================================================================
    // UI Events
    // =========================================================================
    /// Transient user-facing notice (toast), shown for `duration_ms`.
    Notice {
        text: String,
        duration_ms: u64,
        timestamp: Timestamp,
    },
}

impl DomainEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DomainEvent::MessageAppended { timestamp, .. }
            | DomainEvent::MessageRemoved { timestamp, .. }
            | DomainEvent::SessionCleared { timestamp, .. }
            | DomainEvent::TurnSubmitted { timestamp, .. }
            | DomainEvent::ModeChanged { timestamp, .. }
            | DomainEvent::ViewChanged { timestamp, .. }
            | DomainEvent::PersonaChanged { timestamp, .. }
            | DomainEvent::CallStateChanged { timestamp, .. }
            | DomainEvent::CallEnded { timestamp, .. }
            | DomainEvent::BroadcastGenerating { timestamp, .. }
            | DomainEvent::SuggestionPublished { timestamp, .. }
            | DomainEvent::SuggestionCleared { timestamp }
            | DomainEvent::CalendarSuggestionPublished { timestamp, .. }
            | DomainEvent::CalendarSuggestionCleared { timestamp }
            | DomainEvent::ProactiveActionPublished { timestamp, .. }
            | DomainEvent::ProactiveActionCleared { timestamp }
            | DomainEvent::WorkflowRun { timestamp, .. }
            | DomainEvent::Notice { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a snake_case event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::MessageAppended { .. } => "message_appended",
            DomainEvent::MessageRemoved { .. } => "message_removed",
            DomainEvent::SessionCleared { .. } => "session_cleared",
            DomainEvent::TurnSubmitted { .. } => "turn_submitted",
            DomainEvent::ModeChanged { .. } => "mode_changed",
            DomainEvent::ViewChanged { .. } => "view_changed",
            DomainEvent::PersonaChanged { .. } => "persona_changed",
            DomainEvent::CallStateChanged { .. } => "call_state_changed",
            DomainEvent::CallEnded { .. } => "call_ended",
            DomainEvent::BroadcastGenerating { .. } => "broadcast_generating",
            DomainEvent::SuggestionPublished { .. } => "suggestion_published",
            DomainEvent::SuggestionCleared { .. } => "suggestion_cleared",
            DomainEvent::CalendarSuggestionPublished { .. } => "calendar_suggestion_published",
            DomainEvent::CalendarSuggestionCleared { .. } => "calendar_suggestion_cleared",
            DomainEvent::ProactiveActionPublished { .. } => "proactive_action_published",
            DomainEvent::ProactiveActionCleared { .. } => "proactive_action_cleared",
            DomainEvent::WorkflowRun { .. } => "workflow_run",
            DomainEvent::Notice { .. } => "notice",
        }
    }
}

/// Fan-out channel for [`DomainEvent`]s.
///
/// Cloning yields another handle onto the same channel. Publishing with no
/// subscribers is not an error.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
    notice_duration_ms: u64,
}

pub const DEFAULT_NOTICE_DURATION_MS: u64 = 3000;

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            notice_duration_ms: DEFAULT_NOTICE_DURATION_MS,
        }
    }

    /// How long notices published through [`notice`](Self::notice) stay up.
    pub fn with_notice_duration(mut self, duration_ms: u64) -> Self {
        self.notice_duration_ms = duration_ms;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: DomainEvent) {
        tracing::trace!(event = event.event_name(), "Publishing domain event");
        let _ = self.tx.send(event);
    }

    /// Publish a transient user-facing notice.
    pub fn notice(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!(notice = %text, "Notice");
        self.publish(DomainEvent::Notice {
            text,
            duration_ms: self.notice_duration_ms,
            timestamp: Timestamp::now(),
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
