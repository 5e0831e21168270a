use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Conversation mode. Each mode owns an independent message history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// General-purpose assistant chat.
    Default,
    /// News briefings and headline discussion.
    News,
    /// Quiz show.
    Quiz,
    /// Debate stage.
    Debate,
    /// Live translation.
    Translator,
    /// Meeting capture and reports.
    Meeting,
}

impl Mode {
    /// Every declared mode, in declaration order.
    pub const ALL: [Mode; 6] = [
        Mode::Default,
        Mode::News,
        Mode::Quiz,
        Mode::Debate,
        Mode::Translator,
        Mode::Meeting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Default => "default",
            Mode::News => "news",
            Mode::Quiz => "quiz",
            Mode::Debate => "debate",
            Mode::Translator => "translator",
            Mode::Meeting => "meeting",
        }
    }

    /// Human-readable name used in notices.
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Default => "Default",
            Mode::News => "News",
            Mode::Quiz => "Quiz",
            Mode::Debate => "Debate",
            Mode::Translator => "Translator",
            Mode::Meeting => "Meeting",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown mode: {}", s))
    }
}

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
    System,
}

/// Delivery status of a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    #[default]
    Sent,
    Read,
}

/// Named voice/identity profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persona {
    #[default]
    #[serde(rename = "Agent Zero")]
    AgentZero,
    #[serde(rename = "Agent Zara")]
    AgentZara,
}

impl Persona {
    pub fn display_name(&self) -> &'static str {
        match self {
            Persona::AgentZero => "Agent Zero",
            Persona::AgentZara => "Agent Zara",
        }
    }

    /// The other persona, used by the persona toggle.
    pub fn other(&self) -> Persona {
        match self {
            Persona::AgentZero => Persona::AgentZara,
            Persona::AgentZara => Persona::AgentZero,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Top-level screen shown by the UI collaborator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum View {
    #[default]
    Dashboard,
    Chat,
    Settings,
    StudyHub,
    Calendar,
    AppDrawer,
    AiWriter,
    CodeHelper,
    VoiceJournal,
}

/// Lifecycle state of the live call / broadcast session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    Standby,
    Connected,
    Paused,
}

impl CallState {
    /// Whether a call is in progress (connected or paused).
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Connected | CallState::Paused)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Idle => write!(f, "idle"),
            CallState::Standby => write!(f, "standby"),
            CallState::Connected => write!(f, "connected"),
            CallState::Paused => write!(f, "paused"),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Message identifier. Unique across all modes of a session.
pub type MessageId = i64;

/// A single emoji reaction and how many times it was applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
}

/// Content attached to a message. Parsing happens outside the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Attachment {
    Image { data: String, mime_type: String },
    Document { name: String, content: String, mime_type: String },
    Audio { data: String },
}

/// A chat message owned by exactly one mode of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    #[serde(default)]
    pub text: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Tombstone set while the removal grace delay runs.
    #[serde(default)]
    pub is_deleting: bool,
}

impl Message {
    pub fn new(id: MessageId, sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id,
            sender,
            text: text.into(),
            timestamp: Timestamp::now().0,
            attachment: None,
            status: MessageStatus::Sent,
            starred: false,
            reactions: Vec::new(),
            is_deleting: false,
        }
    }

    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, Sender::User, text)
    }

    pub fn bot(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, Sender::Bot, text)
    }

    pub fn system(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            status: MessageStatus::Read,
            ..Self::new(id, Sender::System, text)
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn has_image(&self) -> bool {
        matches!(self.attachment, Some(Attachment::Image { .. }))
    }

    pub fn has_audio(&self) -> bool {
        matches!(self.attachment, Some(Attachment::Audio { .. }))
    }

    /// Apply an emoji reaction: bump the count if present, else append.
    pub fn add_reaction(&mut self, emoji: &str) {
        match self.reactions.iter_mut().find(|r| r.emoji == emoji) {
            Some(existing) => existing.count += 1,
            None => self.reactions.push(Reaction {
                emoji: emoji.to_string(),
                count: 1,
            }),
        }
    }
}

/// Hands out unique, increasing message ids.
///
/// Ids follow wall-clock milliseconds but never repeat, even when two
/// messages are created within the same millisecond.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: AtomicI64,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> MessageId {
        let now = Timestamp::now().0;
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(prev + 1)
    }

    /// Make sure future ids are greater than `id` (used after restoring state).
    pub fn observe(&self, id: MessageId) {
        self.last.fetch_max(id, Ordering::SeqCst);
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// Per-mode message history.
///
/// Invariant: every [`Mode`] has an entry at all times. Deserialization fills
/// missing modes with empty sequences and drops keys that are not modes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSessions(BTreeMap<Mode, Vec<Message>>);

impl Default for ChatSessions {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSessions {
    pub fn new() -> Self {
        Self(Mode::ALL.iter().map(|m| (*m, Vec::new())).collect())
    }

    pub fn get(&self, mode: Mode) -> &[Message] {
        self.0.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_mut(&mut self, mode: Mode) -> &mut Vec<Message> {
        self.0.entry(mode).or_default()
    }

    /// Install a new sequence for `mode`.
    pub fn replace(&mut self, mode: Mode, messages: Vec<Message>) {
        self.0.insert(mode, messages);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Mode, &Vec<Message>)> {
        self.0.iter().map(|(m, v)| (*m, v))
    }

    pub fn all_messages(&self) -> impl Iterator<Item = &Message> {
        self.0.values().flatten()
    }

    pub fn total_messages(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Highest message id across all modes.
    pub fn max_id(&self) -> Option<MessageId> {
        self.all_messages().map(|m| m.id).max()
    }

    /// Mode that currently holds message `id`, scanning in declaration order.
    pub fn mode_of(&self, id: MessageId) -> Option<Mode> {
        self.0
            .iter()
            .find(|(_, msgs)| msgs.iter().any(|m| m.id == id))
            .map(|(mode, _)| *mode)
    }

    pub fn find(&self, id: MessageId) -> Option<&Message> {
        self.all_messages().find(|m| m.id == id)
    }
}

impl Serialize for ChatSessions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChatSessions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: BTreeMap<String, Vec<Message>> = BTreeMap::deserialize(deserializer)?;
        let mut sessions = ChatSessions::new();
        for (key, messages) in raw {
            match key.parse::<Mode>() {
                Ok(mode) => sessions.replace(mode, messages),
                Err(_) => {
                    tracing::warn!(mode = %key, dropped = messages.len(), "Dropping unknown mode from session data");
                }
            }
        }
        Ok(sessions)
    }
}

// =============================================================================
// Calendar / proactive
// =============================================================================

/// An event supplied by the calendar collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    /// Epoch milliseconds.
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A calendar event that has not been assigned an id yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCalendarEvent {
    pub title: String,
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// AI-suggested switch into another mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveSuggestion {
    pub target_mode: Mode,
    pub initial_prompt: String,
}

/// Suggestion raised by an upcoming calendar event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveCalendarSuggestion {
    pub suggestion_text: String,
    pub source_event: CalendarEvent,
}

/// Pre-generated content waiting for the user to accept it into a mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveAction {
    pub target_mode: Mode,
    pub generated_content: Message,
}

// =============================================================================
// Workflows
// =============================================================================

/// Kind of a workflow step. Unknown kinds are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    GetNews,
    Other(String),
}

impl From<String> for StepType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "get_news" => StepType::GetNews,
            _ => StepType::Other(s),
        }
    }
}

impl From<StepType> for String {
    fn from(t: StepType) -> Self {
        match t {
            StepType::GetNews => "get_news".to_string(),
            StepType::Other(s) => s,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepType::GetNews => f.write_str("get_news"),
            StepType::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowStep {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

/// A user-authored automation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Persisted preferences and records
// =============================================================================

/// User-facing settings persisted under the `settings` key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub voice_name: String,
    pub language: String,
    pub sound_effects: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice_name: "Puck".to_string(),
            language: "English".to_string(),
            sound_effects: true,
        }
    }
}

/// Study streak tracking.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudyProgress {
    pub study_days: Vec<String>,
    pub total_items: u32,
}

/// Uploaded resume text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeContent {
    pub name: String,
    pub content: String,
}

/// Whiteboard elements are drawn by the UI; the engine stores them opaquely.
pub type WhiteboardElement = serde_json::Value;

/// Study hub items are rendered by the UI; the engine stores them opaquely.
pub type StudyHubItem = serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Live,
    Broadcast,
}

/// History entry written when an active call ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: Uuid,
    pub kind: CallKind,
    pub persona: Persona,
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
    pub duration_secs: f64,
}

// =============================================================================
// Time
// =============================================================================

/// Epoch milliseconds. Compared by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Milliseconds from `self` until `later` (negative if `later` is earlier).
    pub fn millis_until(&self, later: i64) -> i64 {
        later - self.0
    }
}
