//! Launch parameters carried in a share link's query string.

use tracing::debug;

use kwararru_chat::share::{self, SharedSessionState, CONTENT_PARAM, SESSION_PARAM};
use kwararru_core::types::Message;

/// How the application was opened.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Launch {
    #[default]
    Fresh,
    /// Pre-loaded from a `session` link.
    Session(SharedSessionState),
    /// Read-only view of a single message from a `content` link.
    SharedContent(Message),
}

impl Launch {
    /// Resolve `?session=` / `?content=` from a query string.
    ///
    /// A decodable `content` parameter wins over `session`. Malformed values
    /// are logged and ignored.
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let param = |name: &str| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value)
                .filter(|value| !value.is_empty())
        };

        if let Some(message) = param(CONTENT_PARAM).and_then(share::decode_message) {
            return Launch::SharedContent(message);
        }
        if let Some(state) = param(SESSION_PARAM).and_then(share::decode_session) {
            return Launch::Session(state);
        }
        debug!("No shared state in launch parameters");
        Launch::Fresh
    }

    /// Resolve launch parameters from a full URL.
    pub fn from_url(url: &str) -> Self {
        let without_fragment = url.split('#').next().unwrap_or_default();
        match without_fragment.split_once('?') {
            Some((_, query)) => Self::from_query(query),
            None => Launch::Fresh,
        }
    }

    pub fn shared_session(&self) -> Option<&SharedSessionState> {
        match self {
            Launch::Session(state) => Some(state),
            _ => None,
        }
    }

    pub fn shared_content(&self) -> Option<&Message> {
        match self {
            Launch::SharedContent(message) => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwararru_core::types::{ChatSessions, Mode, Persona};

    fn shared_state() -> SharedSessionState {
        let mut sessions = ChatSessions::new();
        sessions.get_mut(Mode::Quiz).push(Message::user(1, "quiz me on rivers"));
        SharedSessionState {
            chat_sessions: sessions,
            whiteboard_elements: Vec::new(),
            ai_mode: Mode::Quiz,
            persona: Persona::AgentZara,
        }
    }

    #[test]
    fn test_fresh_without_params() {
        assert_eq!(Launch::from_query(""), Launch::Fresh);
        assert_eq!(Launch::from_query("?admin=true"), Launch::Fresh);
        assert_eq!(Launch::from_url("http://localhost:5173/"), Launch::Fresh);
    }

    #[test]
    fn test_session_param() {
        let state = shared_state();
        let query = format!("?session={}", share::encode(&state).unwrap());
        assert_eq!(Launch::from_query(&query), Launch::Session(state));
    }

    #[test]
    fn test_content_wins_over_session() {
        let message = Message::bot(9, "Ẹ kú àárọ̀");
        let query = format!(
            "session={}&content={}",
            share::encode(&shared_state()).unwrap(),
            share::encode(&message).unwrap()
        );
        let launch = Launch::from_query(&query);
        assert_eq!(launch.shared_content(), Some(&message));
        assert!(launch.shared_session().is_none());
    }

    #[test]
    fn test_malformed_content_falls_back_to_session() {
        let state = shared_state();
        let query = format!("content=%%%&session={}", share::encode(&state).unwrap());
        assert_eq!(Launch::from_query(&query), Launch::Session(state));
    }

    #[test]
    fn test_from_url_ignores_fragment() {
        let message = Message::user(3, "hi");
        let url = format!(
            "http://localhost:5173/?content={}#top",
            share::encode(&message).unwrap()
        );
        assert_eq!(Launch::from_url(&url), Launch::SharedContent(message));
    }

    #[test]
    fn test_malformed_everything_is_fresh() {
        assert_eq!(Launch::from_query("session=notbase64!!"), Launch::Fresh);
    }
}
