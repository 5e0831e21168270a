//! Call payloads and the collaborator seams the coordinator talks to.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kwararru_core::config::CallConfig;
use kwararru_core::error::KwararruError;
use kwararru_core::types::{CallRecord, Message, Persona};

/// One line of a generated news script, before speech synthesis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSegment {
    pub persona: Persona,
    pub text: String,
}

/// A script line with its synthesized audio.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSegment {
    pub persona: Persona,
    pub text: String,
    /// Base64 audio; `None` when the synthesizer had nothing to return.
    pub audio: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LiveCallParams {
    pub persona: Persona,
    pub system_instruction: Option<String>,
    pub context: Vec<Message>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CallPayload {
    Broadcast(Vec<BroadcastSegment>),
    Live(LiveCallParams),
}

/// Transcript data handed over when an active call ends.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTranscript {
    pub polished: String,
    pub english: String,
    pub speaker_names: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BroadcastAction {
    PlayPauseResume,
    Stop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastOptions {
    pub location: String,
    pub category: String,
}

impl BroadcastOptions {
    pub fn from_config(config: &CallConfig) -> Self {
        Self {
            location: config.broadcast_location.clone(),
            category: config.broadcast_category.clone(),
        }
    }

    pub fn prompt(&self) -> String {
        format!(
            "Generate a concise daily news briefing summarizing top news for {} in the {} category.",
            self.location, self.category
        )
    }
}

/// Speech voice per persona.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceMap {
    pub agent_zero: String,
    pub agent_zara: String,
}

impl Default for VoiceMap {
    fn default() -> Self {
        Self::from_config(&CallConfig::default())
    }
}

impl VoiceMap {
    pub fn from_config(config: &CallConfig) -> Self {
        Self {
            agent_zero: config.agent_zero_voice.clone(),
            agent_zara: config.agent_zara_voice.clone(),
        }
    }

    pub fn voice_for(&self, persona: Persona) -> &str {
        match persona {
            Persona::AgentZero => &self.agent_zero,
            Persona::AgentZara => &self.agent_zara,
        }
    }
}

#[async_trait]
pub trait NewsScriptGenerator: Send + Sync {
    /// `Ok(None)` means the service answered but produced no script.
    async fn generate_news_script(
        &self,
        prompt: &str,
    ) -> Result<Option<Vec<ScriptSegment>>, KwararruError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn generate_speech(&self, text: &str, voice: &str)
        -> Result<Option<String>, KwararruError>;
}

#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn latest_headlines(&self) -> Result<Vec<String>, KwararruError>;
}

/// Receives the transcript and record of every call that ends while active.
#[async_trait]
pub trait CallEndHandler: Send + Sync {
    async fn on_call_end(&self, transcript: CallTranscript, record: CallRecord);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_wording() {
        let options = BroadcastOptions {
            location: "Lagos".into(),
            category: "Technology".into(),
        };
        assert_eq!(
            options.prompt(),
            "Generate a concise daily news briefing summarizing top news for Lagos in the Technology category."
        );
    }

    #[test]
    fn test_defaults_from_config() {
        let options = BroadcastOptions::from_config(&CallConfig::default());
        assert_eq!(options.location, "Nigeria");
        assert_eq!(options.category, "General");

        let voices = VoiceMap::default();
        assert_eq!(voices.voice_for(Persona::AgentZero), "Puck");
        assert_eq!(voices.voice_for(Persona::AgentZara), "Kore");
    }
}
