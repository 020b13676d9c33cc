//! Presence store: who is away, since when, and why.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::UserId;

/// Reason recorded when `/afk` is sent without one.
pub const NO_REASON: &str = "(no reason)";

/// One participant's away status. Existence is the only away signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AfkRecord {
    pub user_id: UserId,
    /// Display name captured when the record was created. Not re-synced.
    pub display_name: String,
    pub reason: String,
    pub since: DateTime<Utc>,
    /// Normalized handle registered in the name index for this record, if any.
    pub handle: Option<String>,
}

impl AfkRecord {
    pub fn new(user_id: UserId, display_name: &str, reason: Option<&str>) -> Self {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(NO_REASON);
        Self {
            user_id,
            display_name: display_name.to_string(),
            reason: reason.to_string(),
            since: Utc::now(),
            handle: None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PresenceStore {
    records: HashMap<UserId, AfkRecord>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any existing record for `user_id` with a fresh one stamped now.
    pub fn set_afk(
        &mut self,
        user_id: UserId,
        display_name: &str,
        reason: Option<&str>,
    ) -> AfkRecord {
        let record = AfkRecord::new(user_id, display_name, reason);
        self.records.insert(user_id, record.clone());
        record
    }

    /// Insert a fully formed record (restore path).
    pub fn insert(&mut self, record: AfkRecord) {
        self.records.insert(record.user_id, record);
    }

    pub fn clear_afk(&mut self, user_id: UserId) -> Option<AfkRecord> {
        self.records.remove(&user_id)
    }

    pub fn is_afk(&self, user_id: UserId) -> bool {
        self.records.contains_key(&user_id)
    }

    pub fn get(&self, user_id: UserId) -> Option<&AfkRecord> {
        self.records.get(&user_id)
    }

    pub fn get_mut(&mut self, user_id: UserId) -> Option<&mut AfkRecord> {
        self.records.get_mut(&user_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AfkRecord> {
        self.records.values()
    }
}
