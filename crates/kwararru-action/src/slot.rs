//! Single-occupancy holder for a pending suggestion.
//!
//! At most one value is live at a time. Accepting or dismissing takes the
//! value out, so a second accept is a no-op.

use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct SuggestionSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> Default for SuggestionSlot<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }
}

impl<T: Clone> SuggestionSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install `value`, replacing any live one. Returns the replaced value.
    pub fn replace(&self, value: T) -> Option<T> {
        self.lock().replace(value)
    }

    /// Install `value` only if the slot is empty.
    pub fn try_publish(&self, value: T) -> bool {
        let mut slot = self.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }

    /// Remove and return the live value.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }

    pub fn is_live(&self) -> bool {
        self.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_publish_single_occupancy() {
        let slot = SuggestionSlot::new();
        assert!(slot.try_publish("first"));
        assert!(!slot.try_publish("second"));
        assert_eq!(slot.get(), Some("first"));
    }

    #[test]
    fn test_replace_returns_previous() {
        let slot = SuggestionSlot::new();
        assert_eq!(slot.replace(1), None);
        assert_eq!(slot.replace(2), Some(1));
        assert_eq!(slot.get(), Some(2));
    }

    #[test]
    fn test_take_empties_slot() {
        let slot = SuggestionSlot::new();
        slot.replace("x");
        assert!(slot.is_live());
        assert_eq!(slot.take(), Some("x"));
        assert_eq!(slot.take(), None);
        assert!(!slot.is_live());
    }
}
