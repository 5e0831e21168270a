//! Session store: the single writer of per-mode message history.
//!
//! Every mutation is one locked read-modify-write step, so concurrent
//! handlers never lose each other's updates. Callers only ever receive
//! copies of messages.
//!
//! Removal is two-phase: the message is tombstoned (`is_deleting`) right
//! away and dropped after a grace delay by a timer task the store owns.
//!
//! An optional [`ChangeHook`] sees the full sessions after every mutation,
//! still under the store lock, so writes reach it in mutation order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use kwararru_core::events::{DomainEvent, EventBus};
use kwararru_core::types::{ChatSessions, Message, MessageId, MessageIdGenerator, Mode, Timestamp};

use crate::error::ChatError;

/// Called with every mode's history after each mutation. Runs under the
/// store lock and must not call back into the store.
pub type ChangeHook = Arc<dyn Fn(&ChatSessions) + Send + Sync>;

/// Cheaply cloneable handle onto one set of chat sessions.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    sessions: Mutex<ChatSessions>,
    pending: Mutex<HashMap<MessageId, JoinHandle<()>>>,
    ids: MessageIdGenerator,
    grace: Duration,
    events: EventBus,
    on_change: RwLock<Option<ChangeHook>>,
}

impl Inner {
    fn changed(&self, sessions: &ChatSessions) {
        let hook = self
            .on_change
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(hook) = hook {
            hook(sessions);
        }
    }

    fn lock_sessions(&self) -> Result<MutexGuard<'_, ChatSessions>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::Storage(format!("session lock poisoned: {}", e)))
    }

    fn lock_pending(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<MessageId, JoinHandle<()>>>, ChatError> {
        self.pending
            .lock()
            .map_err(|e| ChatError::Storage(format!("pending removal lock poisoned: {}", e)))
    }

    /// Second phase of a removal. Lock order is pending, then sessions.
    fn finish_removal(&self, mode: Mode, id: MessageId) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }

        let removed = match self.sessions.lock() {
            Ok(mut sessions) => {
                let messages = sessions.get_mut(mode);
                let before = messages.len();
                messages.retain(|m| m.id != id);
                let removed = before != messages.len();
                if removed {
                    self.changed(&sessions);
                }
                removed
            }
            Err(e) => {
                warn!(message_id = id, error = %e, "Could not finish message removal");
                false
            }
        };

        if removed {
            debug!(mode = %mode, message_id = id, "Message removed");
            self.events.publish(DomainEvent::MessageRemoved {
                mode,
                message_id: id,
                timestamp: Timestamp::now(),
            });
        }
    }

    fn abort_pending(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            for (_, task) in pending.drain() {
                task.abort();
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(pending) = self.pending.get_mut() {
            for (_, task) in pending.drain() {
                task.abort();
            }
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("grace", &self.inner.grace)
            .finish()
    }
}

impl SessionStore {
    pub fn new(grace: Duration, events: EventBus) -> Self {
        Self::with_sessions(ChatSessions::new(), grace, events)
    }

    pub fn with_sessions(sessions: ChatSessions, grace: Duration, events: EventBus) -> Self {
        let ids = MessageIdGenerator::new();
        if let Some(max) = sessions.max_id() {
            ids.observe(max);
        }
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(sessions),
                pending: Mutex::new(HashMap::new()),
                ids,
                grace,
                events,
                on_change: RwLock::new(None),
            }),
        }
    }

    /// Install the hook that observes every mutation. Replaces any previous
    /// hook.
    pub fn set_change_hook(&self, hook: ChangeHook) {
        *self
            .inner
            .on_change
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(hook);
    }

    /// A fresh message id, unique within this store.
    pub fn next_id(&self) -> MessageId {
        self.inner.ids.next_id()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Add `message` to the end of `mode`'s sequence.
    pub fn append(&self, mode: Mode, message: Message) -> Result<MessageId, ChatError> {
        let id = message.id;
        self.inner.ids.observe(id);
        {
            let mut sessions = self.inner.lock_sessions()?;
            sessions.get_mut(mode).push(message);
            self.inner.changed(&sessions);
        }

        debug!(mode = %mode, message_id = id, "Message appended");
        self.inner.events.publish(DomainEvent::MessageAppended {
            mode,
            message_id: id,
            timestamp: Timestamp::now(),
        });
        Ok(id)
    }

    /// Apply `mutator` to the first message with `id`, scanning modes in
    /// declaration order. Returns the mode that held it.
    pub fn update_by_id<F>(&self, id: MessageId, mutator: F) -> Result<Mode, ChatError>
    where
        F: FnOnce(&mut Message),
    {
        let mut sessions = self.inner.lock_sessions()?;
        for mode in Mode::ALL {
            if let Some(message) = sessions.get_mut(mode).iter_mut().find(|m| m.id == id) {
                mutator(message);
                self.inner.changed(&sessions);
                return Ok(mode);
            }
        }
        Err(ChatError::MessageNotFound(id))
    }

    /// Concatenate `chunk` onto message `id` within `mode` only.
    ///
    /// Returns `false` when the message is not in that mode; late chunks for
    /// a message that moved or vanished are dropped.
    pub fn append_text_chunk(
        &self,
        mode: Mode,
        id: MessageId,
        chunk: &str,
    ) -> Result<bool, ChatError> {
        let mut sessions = self.inner.lock_sessions()?;
        match sessions.get_mut(mode).iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.text.push_str(chunk);
                self.inner.changed(&sessions);
                Ok(true)
            }
            None => {
                debug!(mode = %mode, message_id = id, "Dropping chunk for absent message");
                Ok(false)
            }
        }
    }

    /// Tombstone message `id` in `mode` and remove it after the grace delay.
    ///
    /// Removing an id whose timer is still pending is a no-op. Outside a
    /// tokio runtime the removal happens immediately.
    pub fn remove(&self, mode: Mode, id: MessageId) -> Result<(), ChatError> {
        let mut pending = self.inner.lock_pending()?;
        if pending.contains_key(&id) {
            debug!(message_id = id, "Removal already pending");
            return Ok(());
        }

        {
            let mut sessions = self.inner.lock_sessions()?;
            let message = sessions
                .get_mut(mode)
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or(ChatError::MessageNotFound(id))?;
            message.is_deleting = true;
            self.inner.changed(&sessions);
        }

        match Handle::try_current() {
            Ok(handle) => {
                let weak = Arc::downgrade(&self.inner);
                let grace = self.inner.grace;
                let task = handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.finish_removal(mode, id);
                    }
                });
                pending.insert(id, task);
            }
            Err(_) => {
                drop(pending);
                self.inner.finish_removal(mode, id);
            }
        }
        Ok(())
    }

    /// Stop a pending removal and clear the tombstone.
    ///
    /// Returns `false` if no removal was pending for `id`.
    pub fn cancel_removal(&self, id: MessageId) -> Result<bool, ChatError> {
        let task = self.inner.lock_pending()?.remove(&id);
        let Some(task) = task else {
            return Ok(false);
        };
        task.abort();
        // The message may already be gone if the timer won the race.
        let _ = self.update_by_id(id, |m| m.is_deleting = false);
        Ok(true)
    }

    /// Replace `mode`'s sequence with an empty one.
    pub fn clear(&self, mode: Mode) -> Result<(), ChatError> {
        {
            let mut sessions = self.inner.lock_sessions()?;
            sessions.replace(mode, Vec::new());
            self.inner.changed(&sessions);
        }
        self.inner.events.publish(DomainEvent::SessionCleared {
            mode,
            timestamp: Timestamp::now(),
        });
        Ok(())
    }

    /// Flip the starred flag. Returns the new value.
    pub fn toggle_star(&self, id: MessageId) -> Result<bool, ChatError> {
        let mut starred = false;
        self.update_by_id(id, |m| {
            m.starred = !m.starred;
            starred = m.starred;
        })?;
        Ok(starred)
    }

    pub fn add_reaction(&self, id: MessageId, emoji: &str) -> Result<(), ChatError> {
        self.update_by_id(id, |m| m.add_reaction(emoji))?;
        Ok(())
    }

    pub fn update_text(&self, id: MessageId, text: &str) -> Result<(), ChatError> {
        self.update_by_id(id, |m| m.text = text.to_string())?;
        Ok(())
    }

    /// Copy of `mode`'s messages.
    pub fn messages(&self, mode: Mode) -> Result<Vec<Message>, ChatError> {
        Ok(self.inner.lock_sessions()?.get(mode).to_vec())
    }

    pub fn get(&self, id: MessageId) -> Result<Option<Message>, ChatError> {
        Ok(self.inner.lock_sessions()?.find(id).cloned())
    }

    pub fn snapshot(&self) -> Result<ChatSessions, ChatError> {
        Ok(self.inner.lock_sessions()?.clone())
    }

    /// Replace every mode's history, cancelling pending removals. The change
    /// hook is not called.
    pub fn restore(&self, sessions: ChatSessions) -> Result<(), ChatError> {
        self.inner.abort_pending();
        if let Some(max) = sessions.max_id() {
            self.inner.ids.observe(max);
        }
        *self.inner.lock_sessions()? = sessions;
        Ok(())
    }

    pub fn pending_removals(&self) -> usize {
        self.inner.lock_pending().map(|p| p.len()).unwrap_or(0)
    }

    /// Cancel all deletion timers. Tombstoned messages stay tombstoned.
    pub fn shutdown(&self) {
        self.inner.abort_pending();
    }
}
