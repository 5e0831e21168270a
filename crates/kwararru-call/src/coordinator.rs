//! Call-lifecycle coordinator.
//!
//! Owns the call state machine, the data of the call in progress, and the
//! broadcast pipeline (script, then speech per segment, then start).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, info, warn};
use uuid::Uuid;

use kwararru_core::events::{DomainEvent, EventBus};
use kwararru_core::types::{CallKind, CallRecord, CallState, Persona, Timestamp};

use crate::error::CallError;
use crate::services::{
    BroadcastAction, BroadcastOptions, BroadcastSegment, CallEndHandler, CallPayload,
    CallTranscript, HeadlineSource, NewsScriptGenerator, SpeechSynthesizer, VoiceMap,
};
use crate::state::CallStateMachine;

pub const NO_BRIEFING_NOTICE: &str = "Could not generate a news briefing at this time.";
pub const BRIEFING_FAILED_NOTICE: &str = "Failed to generate news briefing.";

#[derive(Debug, Clone)]
struct ActiveCall {
    kind: CallKind,
    persona: Persona,
    started_at: Timestamp,
    transcript: CallTranscript,
}

/// Script and speech services needed to produce a broadcast.
#[derive(Clone)]
pub struct BroadcastServices {
    pub script: Arc<dyn NewsScriptGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
}

pub struct CallCoordinator {
    machine: CallStateMachine,
    active: Mutex<Option<ActiveCall>>,
    headlines: Mutex<Vec<BroadcastSegment>>,
    ticker: Mutex<Vec<String>>,
    generating: AtomicBool,
    voices: VoiceMap,
    events: EventBus,
    broadcast: Option<BroadcastServices>,
    headline_source: Option<Arc<dyn HeadlineSource>>,
    end_handler: RwLock<Option<Arc<dyn CallEndHandler>>>,
}

impl std::fmt::Debug for CallCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCoordinator")
            .field("state", &self.state())
            .field("generating", &self.is_generating())
            .finish()
    }
}

/// Clears the generating flag on every exit path.
struct GeneratingGuard<'a> {
    flag: &'a AtomicBool,
    events: &'a EventBus,
}

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
        self.events.publish(DomainEvent::BroadcastGenerating {
            active: false,
            timestamp: Timestamp::now(),
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CallCoordinator {
    pub fn new(events: EventBus, voices: VoiceMap) -> Self {
        Self {
            machine: CallStateMachine::new(),
            active: Mutex::new(None),
            headlines: Mutex::new(Vec::new()),
            ticker: Mutex::new(Vec::new()),
            generating: AtomicBool::new(false),
            voices,
            events,
            broadcast: None,
            headline_source: None,
            end_handler: RwLock::new(None),
        }
    }

    pub fn with_broadcast_services(mut self, services: BroadcastServices) -> Self {
        self.broadcast = Some(services);
        self
    }

    pub fn with_headline_source(mut self, source: Arc<dyn HeadlineSource>) -> Self {
        self.headline_source = Some(source);
        self
    }

    /// Register the handler invoked when an active call ends.
    pub fn set_end_handler(&self, handler: Arc<dyn CallEndHandler>) {
        let mut slot = self
            .end_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(handler);
    }

    pub fn state(&self) -> CallState {
        self.machine.current()
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// Segments of the last generated broadcast.
    pub fn headlines(&self) -> Vec<BroadcastSegment> {
        lock(&self.headlines).clone()
    }

    pub fn ticker(&self) -> Vec<String> {
        lock(&self.ticker).clone()
    }

    fn publish_change(&self, from: CallState, to: CallState) {
        self.events.publish(DomainEvent::CallStateChanged {
            from,
            to,
            timestamp: Timestamp::now(),
        });
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start a call from idle or standby.
    pub fn start_call(&self, payload: CallPayload) -> Result<(), CallError> {
        let (kind, persona) = match &payload {
            CallPayload::Broadcast(segments) => (
                CallKind::Broadcast,
                segments.first().map(|s| s.persona).unwrap_or_default(),
            ),
            CallPayload::Live(params) => (CallKind::Live, params.persona),
        };

        let from = self
            .machine
            .transition_from(&[CallState::Idle, CallState::Standby], CallState::Connected)?;

        *lock(&self.active) = Some(ActiveCall {
            kind,
            persona,
            started_at: Timestamp::now(),
            transcript: CallTranscript::default(),
        });

        info!(kind = ?kind, persona = %persona, "Call started");
        self.publish_change(from, CallState::Connected);
        Ok(())
    }

    pub fn pause(&self) -> Result<(), CallError> {
        let from = self
            .machine
            .transition_from(&[CallState::Connected], CallState::Paused)?;
        self.publish_change(from, CallState::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), CallError> {
        let from = self
            .machine
            .transition_from(&[CallState::Paused], CallState::Connected)?;
        self.publish_change(from, CallState::Connected);
        Ok(())
    }

    /// Replace the transcript of the call in progress. Ignored when no call
    /// is active.
    pub fn record_transcript(&self, transcript: CallTranscript) {
        match lock(&self.active).as_mut() {
            Some(call) => call.transcript = transcript,
            None => debug!("Ignoring transcript, no active call"),
        }
    }

    /// End the call, landing in `target` (idle or standby).
    ///
    /// If a call was active, the end handler receives its transcript and a
    /// call record, which is also returned. Ending in the current state is a
    /// no-op.
    pub async fn end(&self, target: CallState) -> Result<Option<CallRecord>, CallError> {
        if !matches!(target, CallState::Idle | CallState::Standby) {
            return Err(CallError::InvalidEndTarget(target));
        }
        if self.machine.current() == target {
            return Ok(None);
        }

        let from = match self.machine.transition(target) {
            Ok(from) => from,
            // Lost a race with another end() landing on the same target.
            Err(_) if self.machine.current() == target => return Ok(None),
            Err(e) => return Err(e),
        };
        self.publish_change(from, target);

        let finished = lock(&self.active).take();
        let Some(call) = finished.filter(|_| from.is_active()) else {
            return Ok(None);
        };

        let ended_at = Timestamp::now();
        let record = CallRecord {
            id: Uuid::new_v4(),
            kind: call.kind,
            persona: call.persona,
            started_at: call.started_at,
            ended_at,
            duration_secs: (ended_at.0 - call.started_at.0).max(0) as f64 / 1000.0,
        };

        info!(record_id = %record.id, duration_secs = record.duration_secs, "Call ended");
        self.events.publish(DomainEvent::CallEnded {
            record_id: record.id,
            kind: record.kind,
            duration_secs: record.duration_secs,
            timestamp: ended_at,
        });

        let handler = self
            .end_handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler.on_call_end(call.transcript, record.clone()).await;
        }

        Ok(Some(record))
    }

    // =========================================================================
    // Broadcast
    // =========================================================================

    /// Play/pause/resume or stop the news broadcast.
    ///
    /// From idle or standby, play generates a fresh briefing only when
    /// `options` are supplied; without them it does nothing.
    pub async fn handle_broadcast_control(
        &self,
        action: BroadcastAction,
        options: Option<BroadcastOptions>,
    ) -> Result<(), CallError> {
        if action == BroadcastAction::Stop {
            self.end(CallState::Idle).await?;
            return Ok(());
        }

        match self.state() {
            CallState::Connected => self.pause(),
            CallState::Paused => self.resume(),
            CallState::Idle | CallState::Standby => match options {
                Some(options) => self.generate_and_start(&options).await,
                None => {
                    debug!("Play requested without broadcast options");
                    Ok(())
                }
            },
        }
    }

    async fn generate_and_start(&self, options: &BroadcastOptions) -> Result<(), CallError> {
        if self.generating.swap(true, Ordering::SeqCst) {
            debug!("Broadcast generation already in progress");
            return Ok(());
        }
        let _guard = GeneratingGuard {
            flag: &self.generating,
            events: &self.events,
        };
        self.events.publish(DomainEvent::BroadcastGenerating {
            active: true,
            timestamp: Timestamp::now(),
        });
        lock(&self.headlines).clear();

        let segments = match self.generate_briefing(options).await {
            Ok(segments) => segments,
            Err(CallError::EmptyScript) => {
                self.events.notice(NO_BRIEFING_NOTICE);
                return Err(CallError::EmptyScript);
            }
            Err(e) => {
                warn!(error = %e, "Failed to generate and play briefing");
                self.events.notice(BRIEFING_FAILED_NOTICE);
                return Err(e);
            }
        };

        // The state may have moved while the briefing was being generated.
        if let Err(e) = self.start_call(CallPayload::Broadcast(segments.clone())) {
            warn!(error = %e, "Briefing ready but the call could not start");
            self.events.notice(BRIEFING_FAILED_NOTICE);
            return Err(e);
        }
        *lock(&self.headlines) = segments;
        Ok(())
    }

    /// Script first, then speech for each segment in order.
    async fn generate_briefing(
        &self,
        options: &BroadcastOptions,
    ) -> Result<Vec<BroadcastSegment>, CallError> {
        let services = self
            .broadcast
            .as_ref()
            .ok_or(CallError::ServicesUnavailable)?;

        let prompt = options.prompt();
        let script = services
            .script
            .generate_news_script(&prompt)
            .await?
            .filter(|s| !s.is_empty())
            .ok_or(CallError::EmptyScript)?;

        let mut segments = Vec::with_capacity(script.len());
        for segment in script {
            let voice = self.voices.voice_for(segment.persona);
            let audio = services.speech.generate_speech(&segment.text, voice).await?;
            segments.push(BroadcastSegment {
                persona: segment.persona,
                text: segment.text,
                audio,
            });
        }
        debug!(segments = segments.len(), "Briefing generated");
        Ok(segments)
    }

    /// Reload ticker headlines from the headline source.
    pub async fn refresh_ticker(&self) -> Vec<String> {
        let Some(source) = self.headline_source.clone() else {
            return self.ticker();
        };
        match source.latest_headlines().await {
            Ok(headlines) => {
                *lock(&self.ticker) = headlines.clone();
                headlines
            }
            Err(e) => {
                warn!(error = %e, "Could not load latest headlines");
                self.ticker()
            }
        }
    }
}
