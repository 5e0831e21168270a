//! Portable encoding of sessions and single messages for share links.
//!
//! Payloads are JSON, UTF-8 encoded, then base64 with the URL-safe alphabet
//! and no padding. Decoding accepts padded and unpadded input alike, in
//! either the URL-safe or the standard alphabet.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use kwararru_core::types::{ChatSessions, Message, Mode, Persona, WhiteboardElement};

use crate::error::ChatError;

/// Query parameter carrying an encoded [`SharedSessionState`].
pub const SESSION_PARAM: &str = "session";
/// Query parameter carrying an encoded single [`Message`].
pub const CONTENT_PARAM: &str = "content";

const SHARE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Snapshot of a conversation that can be shared and restored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedSessionState {
    pub chat_sessions: ChatSessions,
    #[serde(default)]
    pub whiteboard_elements: Vec<WhiteboardElement>,
    #[serde(default = "default_mode")]
    pub ai_mode: Mode,
    #[serde(default)]
    pub persona: Persona,
}

fn default_mode() -> Mode {
    Mode::Default
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, ChatError> {
    let json = serde_json::to_string(value)?;
    Ok(SHARE_ENGINE.encode(json.as_bytes()))
}

/// Inverse of [`encode`]. Any failure is logged and yields `None`.
pub fn decode<T: DeserializeOwned>(encoded: &str) -> Option<T> {
    let normalized: String = encoded
        .trim()
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = match SHARE_ENGINE.decode(normalized) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to decode base64 share payload");
            return None;
        }
    };
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Share payload is not valid UTF-8");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Share payload is not valid JSON");
            None
        }
    }
}

pub fn decode_session(encoded: &str) -> Option<SharedSessionState> {
    decode(encoded)
}

pub fn decode_message(encoded: &str) -> Option<Message> {
    decode(encoded)
}

/// Append `param=encoded` to `base_url`.
pub fn share_url(base_url: &str, param: &str, encoded: &str) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", base_url, separator, param, encoded)
}

pub fn share_session_url(base_url: &str, state: &SharedSessionState) -> Result<String, ChatError> {
    Ok(share_url(base_url, SESSION_PARAM, &encode(state)?))
}

pub fn share_message_url(base_url: &str, message: &Message) -> Result<String, ChatError> {
    Ok(share_url(base_url, CONTENT_PARAM, &encode(message)?))
}
