//! Typed accessors over a [`KeyValueStore`].
//!
//! Reads never fail: a missing key, a backend error or an unparsable value
//! all yield the documented default. Writes log failures and carry on.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use kwararru_core::types::{
    CallRecord, ChatSessions, Persona, ResumeContent, Settings, StudyHubItem, StudyProgress,
    Workflow,
};

use crate::store::KeyValueStore;

/// Storage keys.
pub mod keys {
    pub const SETTINGS: &str = "kwararru_settings";
    pub const PERSONA: &str = "kwararru_persona";
    pub const CALL_HISTORY: &str = "kwararru_call_history";
    pub const STUDY_HUB: &str = "kwararru_study_hub";
    pub const STUDY_PROGRESS: &str = "kwararru_study_progress";
    pub const WORKFLOWS: &str = "kwararru_workflows";
    pub const RESUME: &str = "kwararru_resume";
    pub const HAS_VISITED: &str = "kwararru_has_visited";

    /// Chat history is stored per user.
    pub fn history(user_id: &str) -> String {
        format!("kwararru_history_{}", user_id)
    }
}

#[derive(Clone)]
pub struct PersistedState {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for PersistedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedState").finish()
    }
}

impl PersistedState {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                error!(key, error = %e, "Failed to read from store");
                None
            }
        }
    }

    fn write_raw(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            error!(key, error = %e, "Failed to save to store");
        }
    }

    fn remove_raw(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            error!(key, error = %e, "Failed to remove from store");
        }
    }

    /// Parse the JSON stored under `key`, or return `default`.
    pub fn load_json<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.read_raw(key) else {
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Could not parse stored JSON, falling back to default");
                default
            }
        }
    }

    pub fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => {
                self.write_raw(key, &json);
                debug!(key, bytes = json.len(), "Persisted");
            }
            Err(e) => error!(key, error = %e, "Failed to serialize value for store"),
        }
    }

    pub fn settings(&self) -> Settings {
        self.load_json(keys::SETTINGS, Settings::default())
    }

    pub fn save_settings(&self, settings: &Settings) {
        self.save_json(keys::SETTINGS, settings);
    }

    /// The persona is stored as its bare display name, not as JSON.
    pub fn persona(&self) -> Option<Persona> {
        let raw = self.read_raw(keys::PERSONA)?;
        match raw.as_str() {
            "Agent Zero" => Some(Persona::AgentZero),
            "Agent Zara" => Some(Persona::AgentZara),
            other => {
                warn!(persona = other, "Ignoring unknown stored persona");
                None
            }
        }
    }

    pub fn save_persona(&self, persona: Persona) {
        self.write_raw(keys::PERSONA, persona.display_name());
    }

    pub fn chat_history(&self, user_id: &str) -> ChatSessions {
        self.load_json(&keys::history(user_id), ChatSessions::new())
    }

    pub fn save_chat_history(&self, user_id: &str, sessions: &ChatSessions) {
        self.save_json(&keys::history(user_id), sessions);
    }

    pub fn call_history(&self) -> Vec<CallRecord> {
        self.load_json(keys::CALL_HISTORY, Vec::new())
    }

    pub fn save_call_history(&self, records: &[CallRecord]) {
        self.save_json(keys::CALL_HISTORY, records);
    }

    pub fn study_hub(&self) -> Vec<StudyHubItem> {
        self.load_json(keys::STUDY_HUB, Vec::new())
    }

    pub fn save_study_hub(&self, items: &[StudyHubItem]) {
        self.save_json(keys::STUDY_HUB, items);
    }

    pub fn study_progress(&self) -> StudyProgress {
        self.load_json(keys::STUDY_PROGRESS, StudyProgress::default())
    }

    pub fn save_study_progress(&self, progress: &StudyProgress) {
        self.save_json(keys::STUDY_PROGRESS, progress);
    }

    pub fn workflows(&self) -> Vec<Workflow> {
        self.load_json(keys::WORKFLOWS, Vec::new())
    }

    pub fn save_workflows(&self, workflows: &[Workflow]) {
        self.save_json(keys::WORKFLOWS, workflows);
    }

    pub fn resume(&self) -> Option<ResumeContent> {
        self.load_json(keys::RESUME, None)
    }

    /// Saving `None` removes the key.
    pub fn save_resume(&self, resume: Option<&ResumeContent>) {
        match resume {
            Some(content) => self.save_json(keys::RESUME, content),
            None => self.remove_raw(keys::RESUME),
        }
    }

    pub fn has_visited(&self) -> bool {
        self.read_raw(keys::HAS_VISITED).is_some()
    }

    pub fn mark_visited(&self) {
        self.write_raw(keys::HAS_VISITED, "true");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};
    use kwararru_core::error::KwararruError;
    use kwararru_core::types::{Message, Mode};

    fn memory_state() -> (Arc<MemoryStore>, PersistedState) {
        let store = Arc::new(MemoryStore::new());
        let state = PersistedState::new(store.clone());
        (store, state)
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, KwararruError> {
            Err(KwararruError::Storage("storage blocked".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), KwararruError> {
            Err(KwararruError::Storage("quota exceeded".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), KwararruError> {
            Err(KwararruError::Storage("storage blocked".into()))
        }
    }

    #[test]
    fn test_defaults_when_empty() {
        let (_, state) = memory_state();
        assert_eq!(state.settings(), Settings::default());
        assert_eq!(state.persona(), None);
        assert!(state.call_history().is_empty());
        assert!(state.study_hub().is_empty());
        assert_eq!(state.study_progress(), StudyProgress::default());
        assert!(state.workflows().is_empty());
        assert_eq!(state.resume(), None);
        assert!(!state.has_visited());
        assert_eq!(state.chat_history("555").total_messages(), 0);
    }

    #[test]
    fn test_unparsable_value_falls_back() {
        let (store, state) = memory_state();
        store.set(keys::SETTINGS, "{not json").unwrap();
        store.set(keys::WORKFLOWS, "42").unwrap();
        assert_eq!(state.settings(), Settings::default());
        assert!(state.workflows().is_empty());
    }

    #[test]
    fn test_persona_stored_as_bare_name() {
        let (store, state) = memory_state();
        state.save_persona(Persona::AgentZara);
        assert_eq!(
            store.get(keys::PERSONA).unwrap().as_deref(),
            Some("Agent Zara")
        );
        assert_eq!(state.persona(), Some(Persona::AgentZara));

        store.set(keys::PERSONA, "Agent Smith").unwrap();
        assert_eq!(state.persona(), None);
    }

    #[test]
    fn test_history_is_per_user_and_fills_modes() {
        let (store, state) = memory_state();
        let mut sessions = ChatSessions::new();
        sessions.get_mut(Mode::Debate).push(Message::user(1, "motion"));
        state.save_chat_history("0801", &sessions);

        assert_eq!(state.chat_history("0801"), sessions);
        assert_eq!(state.chat_history("0802").total_messages(), 0);

        store
            .set(&keys::history("0803"), r#"{"quiz": []}"#)
            .unwrap();
        let partial = state.chat_history("0803");
        assert_eq!(partial.iter().count(), Mode::ALL.len());
    }

    #[test]
    fn test_resume_none_removes_key() {
        let (store, state) = memory_state();
        let resume = ResumeContent {
            name: "cv.pdf".into(),
            content: "Experienced engineer".into(),
        };
        state.save_resume(Some(&resume));
        assert_eq!(state.resume(), Some(resume));
        state.save_resume(None);
        assert_eq!(store.get(keys::RESUME).unwrap(), None);
    }

    #[test]
    fn test_has_visited_flag() {
        let (_, state) = memory_state();
        state.mark_visited();
        assert!(state.has_visited());
    }

    #[test]
    fn test_broken_store_never_panics() {
        let state = PersistedState::new(Arc::new(BrokenStore));
        state.save_settings(&Settings::default());
        state.save_resume(None);
        state.mark_visited();
        assert_eq!(state.settings(), Settings::default());
        assert!(!state.has_visited());
    }

    #[test]
    fn test_works_over_sqlite() {
        let state = PersistedState::new(Arc::new(SqliteStore::in_memory().unwrap()));
        let progress = StudyProgress {
            study_days: vec!["2026-10-01".into()],
            total_items: 3,
        };
        state.save_study_progress(&progress);
        assert_eq!(state.study_progress(), progress);
    }
}
