//! Shared AFK state: the presence store and the name index behind one lock.
//!
//! Every mutation updates both maps and writes the snapshot while holding the
//! write lock, so readers never see the two maps disagree about a user and the
//! file never lags behind what notifications report.

use parking_lot::RwLock;

use super::names::NameIndex;
use super::store::{AfkRecord, PresenceStore};
use super::UserId;
use crate::persist::{Persistence, Snapshot, StoredRecord};

/// The two maps, always observed together.
#[derive(Debug, Default, Clone)]
pub struct AfkBook {
    presence: PresenceStore,
    names: NameIndex,
}

impl AfkBook {
    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    pub fn names(&self) -> &NameIndex {
        &self.names
    }

    /// Resolve a handle to an identity that is currently AFK. An index entry
    /// whose owner has no record is treated as unknown.
    pub fn resolve_afk_handle(&self, handle: &str) -> Option<UserId> {
        self.names
            .resolve(handle)
            .filter(|id| self.presence.is_afk(*id))
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut book = Self::default();
        for (user_id, stored) in snapshot.afk_users {
            book.presence.insert(AfkRecord {
                user_id,
                display_name: stored.name,
                reason: stored.reason,
                since: stored.since,
                handle: None,
            });
        }

        let mut dangling = Vec::new();
        for (handle, user_id) in snapshot.username_to_id {
            match book.presence.get_mut(user_id) {
                Some(record) => {
                    if let Some(key) = book.names.register(&handle, user_id) {
                        record.handle.get_or_insert(key);
                    }
                }
                None => dangling.push(handle),
            }
        }
        for handle in &dangling {
            book.names.unregister(handle);
        }
        if !dangling.is_empty() {
            tracing::warn!(
                count = dangling.len(),
                "dropped handle entries for users who are no longer AFK"
            );
        }
        book
    }

    fn to_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::default();
        for record in self.presence.iter() {
            snapshot.afk_users.insert(
                record.user_id,
                StoredRecord {
                    reason: record.reason.clone(),
                    since: record.since,
                    name: record.display_name.clone(),
                },
            );
        }
        for (handle, user_id) in self.names.iter() {
            snapshot.username_to_id.insert(handle.to_string(), user_id);
        }
        snapshot
    }
}

pub struct AfkState {
    book: RwLock<AfkBook>,
    persistence: Box<dyn Persistence>,
}

impl AfkState {
    /// Build state from whatever `persistence` last saved.
    pub fn restore(persistence: Box<dyn Persistence>) -> Self {
        let book = AfkBook::from_snapshot(persistence.load());
        Self {
            book: RwLock::new(book),
            persistence,
        }
    }

    /// Mark `user_id` away, replacing any previous record, and register
    /// `handle` for textual mentions.
    pub fn set_afk(
        &self,
        user_id: UserId,
        display_name: &str,
        handle: Option<&str>,
        reason: Option<&str>,
    ) -> AfkRecord {
        let mut book = self.book.write();
        let mut record = book.presence.set_afk(user_id, display_name, reason);
        book.names.forget(user_id);
        if let Some(handle) = handle {
            let previous = book.names.resolve(handle);
            if let Some(key) = book.names.register(handle, user_id) {
                // The earlier owner no longer answers to this handle.
                if let Some(owner) = previous.and_then(|id| book.presence.get_mut(id)) {
                    if owner.handle.as_deref() == Some(key.as_str()) {
                        owner.handle = None;
                    }
                }
                record.handle = Some(key);
                if let Some(stored) = book.presence.get_mut(user_id) {
                    stored.handle = record.handle.clone();
                }
            }
        }
        tracing::info!(
            user_id,
            handle = record.handle.as_deref().unwrap_or(""),
            reason = %record.reason,
            "user is now AFK"
        );
        self.persist(&book);
        record
    }

    /// Bring `user_id` back. Returns the removed record, or `None` if the user
    /// was not away.
    pub fn clear_afk(&self, user_id: UserId) -> Option<AfkRecord> {
        let mut book = self.book.write();
        let removed = book.presence.clear_afk(user_id);
        book.names.forget(user_id);
        if removed.is_some() {
            tracing::info!(user_id, "user is back");
        }
        self.persist(&book);
        removed
    }

    /// Like [`clear_afk`](Self::clear_afk), but skips the lock upgrade and the
    /// write when the user is not away. Used on every chat message.
    pub fn clear_afk_if_present(&self, user_id: UserId) -> Option<AfkRecord> {
        if !self.is_afk(user_id) {
            return None;
        }
        let mut book = self.book.write();
        let removed = book.presence.clear_afk(user_id)?;
        book.names.forget(user_id);
        tracing::info!(user_id, "user is back");
        self.persist(&book);
        Some(removed)
    }

    pub fn is_afk(&self, user_id: UserId) -> bool {
        self.book.read().presence.is_afk(user_id)
    }

    pub fn get(&self, user_id: UserId) -> Option<AfkRecord> {
        self.book.read().presence.get(user_id).cloned()
    }

    /// Run `f` against a consistent view of both maps.
    pub fn read<R>(&self, f: impl FnOnce(&AfkBook) -> R) -> R {
        f(&self.book.read())
    }

    /// All current records, oldest first.
    pub fn records(&self) -> Vec<AfkRecord> {
        let mut records: Vec<AfkRecord> = self.book.read().presence.iter().cloned().collect();
        records.sort_by_key(|r| (r.since, r.user_id));
        records
    }

    /// Write failures are logged; in-memory state stays authoritative.
    fn persist(&self, book: &AfkBook) {
        if let Err(e) = self.persistence.save(&book.to_snapshot()) {
            tracing::error!("failed to persist AFK state: {e}");
        }
    }
}
