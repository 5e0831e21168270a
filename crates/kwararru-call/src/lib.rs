//! Call lifecycle for Kwararru.
//!
//! Tracks the live-call / broadcast state machine, generates spoken news
//! briefings, and hands transcripts of finished calls to a registered
//! end handler.

pub mod coordinator;
pub mod error;
pub mod services;
pub mod state;

pub use coordinator::{BroadcastServices, CallCoordinator};
pub use error::CallError;
pub use services::{
    BroadcastAction, BroadcastOptions, BroadcastSegment, CallEndHandler, CallPayload,
    CallTranscript, HeadlineSource, LiveCallParams, NewsScriptGenerator, ScriptSegment,
    SpeechSynthesizer, VoiceMap,
};
pub use state::CallStateMachine;
