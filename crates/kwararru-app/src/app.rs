//! Composition root.
//!
//! Wires the session store, conversation, call coordinator, proactive and
//! workflow engines onto one event bus and one persisted store:
//! 1. Load persisted settings, persona and chat history (or a shared session)
//! 2. Build the conversation and the engines around it; from here on every
//!    chat mutation is written through to the store
//! 3. `start()` loads calendar events and headlines and spawns the scheduler
//! 4. `shutdown()` stops background work and persists state

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use kwararru_action::{
    CalendarScheduler, CalendarService, CalendarSuggestionGenerator, ProactiveEngine,
    WorkflowEngine,
};
use kwararru_call::{BroadcastServices, CallCoordinator, HeadlineSource, VoiceMap};
use kwararru_chat::{
    share, AssistantPanel, AssistantResponder, Conversation, ReplyGenerator, SessionStore,
};
use kwararru_core::config::KwararruConfig;
use kwararru_core::events::EventBus;
use kwararru_core::types::{
    CallRecord, CallState, ChatSessions, Message, MessageId, Persona, Settings,
};
use kwararru_storage::{KeyValueStore, PersistedState, SqliteStore};

use crate::error::AppError;
use crate::launch::Launch;
use crate::meeting::MeetingReportHandler;

pub const SESSION_SHARED_NOTICE: &str = "Nexus Mode: Session share link copied to clipboard!";
pub const SESSION_SHARE_FAILED_NOTICE: &str = "Could not create session share link.";
pub const CONTENT_SHARED_NOTICE: &str = "Shareable content link copied to clipboard!";
pub const CONTENT_SHARE_FAILED_NOTICE: &str = "Could not create share link.";

/// External collaborators. Anything left `None` is simply unavailable.
#[derive(Clone, Default)]
pub struct AppServices {
    pub replies: Option<Arc<dyn ReplyGenerator>>,
    pub broadcast: Option<BroadcastServices>,
    pub headlines: Option<Arc<dyn HeadlineSource>>,
    pub calendar: Option<Arc<dyn CalendarService>>,
    pub calendar_suggestions: Option<Arc<dyn CalendarSuggestionGenerator>>,
    pub assistant: Option<Arc<dyn AssistantResponder>>,
}

struct RunningScheduler {
    scheduler: Arc<CalendarScheduler>,
    handle: JoinHandle<()>,
}

pub struct KwararruApp {
    config: KwararruConfig,
    user_id: String,
    launch: Launch,
    events: EventBus,
    persisted: PersistedState,
    conversation: Conversation,
    calls: Arc<CallCoordinator>,
    meetings: Arc<MeetingReportHandler>,
    proactive: Arc<ProactiveEngine>,
    workflows: WorkflowEngine,
    assistant: Option<AssistantPanel>,
    voices: VoiceMap,
    settings: Mutex<Settings>,
    scheduler: Mutex<Option<RunningScheduler>>,
}

impl std::fmt::Debug for KwararruApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KwararruApp")
            .field("user_id", &self.user_id)
            .field("conversation", &self.conversation)
            .field("calls", &self.calls)
            .finish()
    }
}

impl KwararruApp {
    /// Build the application over `store` for `user_id`.
    ///
    /// A shared-session launch replaces the persisted chat history and
    /// persona with the shared snapshot.
    pub fn new(
        config: KwararruConfig,
        store: Arc<dyn KeyValueStore>,
        user_id: impl Into<String>,
        launch: Launch,
        services: AppServices,
    ) -> Result<Self, AppError> {
        let user_id = user_id.into();
        let events = EventBus::default().with_notice_duration(config.general.notice_duration_ms);
        let persisted = PersistedState::new(store);
        let settings = persisted.settings();

        let sessions = SessionStore::new(config.session.deletion_grace(), events.clone());
        let conversation = Conversation::new(
            sessions,
            services.replies.clone(),
            config.session.max_message_length,
        );

        match launch.shared_session() {
            Some(shared) => {
                info!(mode = %shared.ai_mode, "Launching from shared session");
                conversation.restore(shared.clone())?;
            }
            None => {
                conversation
                    .store()
                    .restore(persisted.chat_history(&user_id))?;
                if let Some(persona) = persisted.persona() {
                    conversation.set_persona(persona);
                }
            }
        }

        let history = persisted.clone();
        let owner = user_id.clone();
        conversation
            .store()
            .set_change_hook(Arc::new(move |sessions: &ChatSessions| {
                history.save_chat_history(&owner, sessions);
            }));

        let voices = VoiceMap::from_config(&config.call);
        let mut calls = CallCoordinator::new(events.clone(), voices.clone());
        if let Some(broadcast) = services.broadcast.clone() {
            calls = calls.with_broadcast_services(broadcast);
        }
        if let Some(headlines) = services.headlines.clone() {
            calls = calls.with_headline_source(headlines);
        }
        let calls = Arc::new(calls);

        let meetings = Arc::new(MeetingReportHandler::new(
            conversation.clone(),
            persisted.clone(),
        ));
        calls.set_end_handler(meetings.clone());

        let mut proactive = ProactiveEngine::new(conversation.clone(), &config.proactive);
        if let Some(calendar) = services.calendar.clone() {
            proactive = proactive.with_calendar(calendar);
        }
        if let Some(suggestions) = services.calendar_suggestions.clone() {
            proactive = proactive.with_suggestion_generator(suggestions);
        }

        let workflows = WorkflowEngine::new(conversation.clone(), persisted.clone());
        let assistant = services.assistant.clone().map(AssistantPanel::new);

        debug!(user_id = %user_id, "Application composed");
        Ok(Self {
            config,
            user_id,
            launch,
            events,
            persisted,
            conversation,
            calls,
            meetings,
            proactive: Arc::new(proactive),
            workflows,
            assistant,
            voices,
            settings: Mutex::new(settings),
            scheduler: Mutex::new(None),
        })
    }

    /// Open the SQLite-backed application described by `config_path`,
    /// installing the global subscriber at the configured log level.
    pub fn open(
        config_path: &Path,
        db_path: &Path,
        user_id: impl Into<String>,
        query: &str,
        services: AppServices,
    ) -> Result<Self, AppError> {
        let config = KwararruConfig::load_or_default(config_path);
        if crate::logging::init_tracing(&config.general.log_level) {
            debug!(level = %config.general.log_level, "Tracing initialised");
        }
        let store = SqliteStore::open(db_path)?;
        info!(path = %db_path.display(), "Store opened");
        Self::new(
            config,
            Arc::new(store),
            user_id,
            Launch::from_query(query),
            services,
        )
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &KwararruConfig {
        &self.config
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn persisted(&self) -> &PersistedState {
        &self.persisted
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn calls(&self) -> &Arc<CallCoordinator> {
        &self.calls
    }

    pub fn proactive(&self) -> &Arc<ProactiveEngine> {
        &self.proactive
    }

    pub fn workflows(&self) -> &WorkflowEngine {
        &self.workflows
    }

    /// The system assistant panel, if a responder was supplied.
    pub fn assistant(&self) -> Option<&AssistantPanel> {
        self.assistant.as_ref()
    }

    pub fn launch(&self) -> &Launch {
        &self.launch
    }

    /// The message to show read-only when launched from a content link.
    pub fn shared_content(&self) -> Option<&Message> {
        self.launch.shared_content()
    }

    pub fn call_history(&self) -> Vec<CallRecord> {
        self.meetings.history()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load calendar events and ticker headlines, then start the calendar
    /// scheduler. Calling it twice does not start a second scheduler.
    pub async fn start(&self) {
        if self.lock_scheduler().is_some() {
            return;
        }

        if let Err(e) = self.proactive.refresh_events().await {
            warn!(error = %e, "Calendar events unavailable at start");
        }
        let headlines = self.calls.refresh_ticker().await;
        debug!(count = headlines.len(), "Ticker headlines loaded");

        let scheduler = Arc::new(CalendarScheduler::new(
            Arc::clone(&self.proactive),
            self.config.proactive.calendar_interval(),
        ));
        let handle = Arc::clone(&scheduler).spawn();

        let mut slot = self.lock_scheduler();
        match slot.as_ref() {
            // Another start() won the race.
            Some(_) => {
                scheduler.shutdown();
                handle.abort();
            }
            None => *slot = Some(RunningScheduler { scheduler, handle }),
        }
        info!("Kwararru started");
    }

    /// Stop background work, end any call and persist state.
    pub async fn shutdown(&self) {
        let running = self.lock_scheduler().take();
        if let Some(running) = running {
            running.scheduler.shutdown();
            if let Err(e) = running.handle.await {
                error!(error = %e, "Calendar scheduler task failed");
            }
        }
        if let Err(e) = self.calls.end(CallState::Idle).await {
            warn!(error = %e, "Could not end call during shutdown");
        }
        self.conversation.store().shutdown();
        self.persist();
        info!("Kwararru stopped");
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, Option<RunningScheduler>> {
        self.scheduler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write chat history, settings and persona to the store.
    pub fn persist(&self) {
        match self.conversation.store().snapshot() {
            Ok(sessions) => self.persisted.save_chat_history(&self.user_id, &sessions),
            Err(e) => error!(error = %e, "Could not snapshot chat history"),
        }
        self.persisted.save_settings(&self.settings());
        self.persisted.save_persona(self.conversation.persona());
    }

    // =========================================================================
    // Settings and persona
    // =========================================================================

    pub fn settings(&self) -> Settings {
        self.lock_settings().clone()
    }

    fn lock_settings(&self) -> MutexGuard<'_, Settings> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f` to the settings and persist them.
    pub fn update_settings(&self, f: impl FnOnce(&mut Settings)) {
        let mut settings = self.lock_settings();
        f(&mut settings);
        self.persisted.save_settings(&settings);
    }

    /// Switch persona; the speech voice follows. Returns `false` if unchanged.
    pub fn set_persona(&self, persona: Persona) -> bool {
        if !self.conversation.set_persona(persona) {
            return false;
        }
        let voice = self.voices.voice_for(persona).to_string();
        self.update_settings(|settings| settings.voice_name = voice);
        self.persisted.save_persona(persona);
        true
    }

    pub fn toggle_persona(&self) -> Persona {
        let next = self.conversation.persona().other();
        self.set_persona(next);
        next
    }

    // =========================================================================
    // Onboarding
    // =========================================================================

    pub fn is_first_visit(&self) -> bool {
        !self.persisted.has_visited()
    }

    pub fn complete_onboarding(&self) {
        self.persisted.mark_visited();
    }

    // =========================================================================
    // Sharing
    // =========================================================================

    /// Build a link that reopens the whole conversation.
    pub fn share_session(&self) -> Option<String> {
        let url = self
            .conversation
            .snapshot()
            .and_then(|state| {
                share::share_session_url(&self.config.general.share_base_url, &state)
            });
        match url {
            Ok(url) => {
                self.conversation.notify(SESSION_SHARED_NOTICE);
                Some(url)
            }
            Err(e) => {
                error!(error = %e, "Failed to create session share link");
                self.conversation.notify(SESSION_SHARE_FAILED_NOTICE);
                None
            }
        }
    }

    /// Build a read-only link to one message.
    pub fn share_message(&self, id: MessageId) -> Option<String> {
        let url = match self.conversation.store().get(id) {
            Ok(Some(message)) => {
                share::share_message_url(&self.config.general.share_base_url, &message)
            }
            Ok(None) => Err(kwararru_chat::ChatError::MessageNotFound(id)),
            Err(e) => Err(e),
        };
        match url {
            Ok(url) => {
                self.conversation.notify(CONTENT_SHARED_NOTICE);
                Some(url)
            }
            Err(e) => {
                error!(message_id = id, error = %e, "Failed to create share link");
                self.conversation.notify(CONTENT_SHARE_FAILED_NOTICE);
                None
            }
        }
    }
}
