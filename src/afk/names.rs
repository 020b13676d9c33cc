//! Handle → identity index used to resolve textual `@handle` mentions.
//!
//! The index has no lifecycle of its own: `AfkState` registers a handle when
//! a user goes AFK and removes it when they come back.

use std::collections::HashMap;

use super::UserId;

/// Lower-case a handle and strip any leading `@`.
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

#[derive(Debug, Default, Clone)]
pub struct NameIndex {
    by_handle: HashMap<String, UserId>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `handle` to `user_id`. A handle already owned by someone else is
    /// reassigned to the newest registrant. Returns the normalized key, or
    /// `None` when the handle is empty after normalization.
    pub fn register(&mut self, handle: &str, user_id: UserId) -> Option<String> {
        let key = normalize_handle(handle);
        if key.is_empty() {
            return None;
        }
        if let Some(previous) = self.by_handle.insert(key.clone(), user_id) {
            if previous != user_id {
                tracing::debug!(handle = %key, previous, user_id, "handle reassigned");
            }
        }
        Some(key)
    }

    pub fn unregister(&mut self, handle: &str) -> Option<UserId> {
        self.by_handle.remove(&normalize_handle(handle))
    }

    pub fn resolve(&self, handle: &str) -> Option<UserId> {
        self.by_handle.get(&normalize_handle(handle)).copied()
    }

    /// Drop every handle that points at `user_id`.
    pub fn forget(&mut self, user_id: UserId) {
        self.by_handle.retain(|_, owner| *owner != user_id);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, UserId)> {
        self.by_handle.iter().map(|(h, id)| (h.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}
