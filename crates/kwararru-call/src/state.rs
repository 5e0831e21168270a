//! Call state machine with thread-safe transitions.
//!
//! Valid transitions:
//! - Idle / Standby -> Connected (start a call)
//! - Connected <-> Paused
//! - Connected / Paused -> Idle / Standby (end a call)
//! - Idle <-> Standby

use std::sync::{Arc, Mutex, MutexGuard};

use kwararru_core::types::CallState;

use crate::error::CallError;

/// Returns whether a transition from `from` to `to` is valid.
pub fn can_transition(from: CallState, to: CallState) -> bool {
    use CallState::*;
    matches!(
        (from, to),
        (Idle, Connected)
            | (Standby, Connected)
            | (Connected, Paused)
            | (Paused, Connected)
            | (Connected, Idle)
            | (Connected, Standby)
            | (Paused, Idle)
            | (Paused, Standby)
            | (Idle, Standby)
            | (Standby, Idle)
    )
}

/// Shared call state. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CallStateMachine {
    state: Arc<Mutex<CallState>>,
}

impl CallStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> CallState {
        *self.lock()
    }

    /// Move to `target`, returning the previous state.
    pub fn transition(&self, target: CallState) -> Result<CallState, CallError> {
        let mut state = self.lock();
        let from = *state;
        if can_transition(from, target) {
            tracing::debug!("Call state: {} -> {}", from, target);
            *state = target;
            Ok(from)
        } else {
            Err(CallError::InvalidTransition { from, to: target })
        }
    }

    /// Move to `target` only if the current state is one of `allowed`.
    pub fn transition_from(
        &self,
        allowed: &[CallState],
        target: CallState,
    ) -> Result<CallState, CallError> {
        let mut state = self.lock();
        let from = *state;
        if allowed.contains(&from) && can_transition(from, target) {
            tracing::debug!("Call state: {} -> {}", from, target);
            *state = target;
            Ok(from)
        } else {
            Err(CallError::InvalidTransition { from, to: target })
        }
    }
}
