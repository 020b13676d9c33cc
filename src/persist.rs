//! Durable JSON snapshot of the presence store and name index.
//!
//! Layout:
//!
//! ```json
//! {
//!   "afk_users": {
//!     "100": { "reason": "lunch", "since": "2026-01-01T12:00:00Z", "name": "Alice" }
//!   },
//!   "username_to_id": { "alice": 100 }
//! }
//! ```
//!
//! Files written before the handle index existed hold only the flat
//! `afk_users` mapping at the top level; those load with an empty index.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::afk::UserId;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode AFK state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted form of one AFK record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub reason: String,
    #[serde(deserialize_with = "deserialize_since")]
    pub since: DateTime<Utc>,
    pub name: String,
}

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub afk_users: BTreeMap<UserId, StoredRecord>,
    #[serde(default)]
    pub username_to_id: BTreeMap<String, UserId>,
}

impl Snapshot {
    /// Parse either layout. A top-level `afk_users` key selects the current
    /// layout; anything else is read as the legacy flat mapping.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let probe: serde_json::Value = serde_json::from_str(raw)?;
        if probe.get("afk_users").is_some() {
            return serde_json::from_str(raw);
        }
        Ok(Self {
            afk_users: serde_json::from_str(raw)?,
            username_to_id: BTreeMap::new(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Accept RFC 3339 timestamps with any offset, plus offset-less ISO 8601
/// timestamps which are taken to be UTC.
fn deserialize_since<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

/// Where snapshots are loaded from and saved to.
pub trait Persistence: Send + Sync {
    /// Load the last saved snapshot. Never fails: missing or corrupt state
    /// yields an empty snapshot.
    fn load(&self) -> Snapshot;

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError>;
}

/// Snapshot stored as a pretty-printed JSON file, replaced atomically.
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Persistence for JsonFile {
    fn load(&self) -> Snapshot {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no AFK data file; starting empty");
                return Snapshot::default();
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "cannot read AFK data file, starting empty: {e}"
                );
                return Snapshot::default();
            }
        };

        match Snapshot::from_json(&raw) {
            Ok(snapshot) => {
                tracing::info!(
                    path = %self.path.display(),
                    users = snapshot.afk_users.len(),
                    handles = snapshot.username_to_id.len(),
                    "loaded AFK data"
                );
                snapshot
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "AFK data file is empty or corrupt, starting empty: {e}"
                );
                Snapshot::default()
            }
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let json = snapshot.to_json()?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        tracing::debug!(
            path = %self.path.display(),
            users = snapshot.afk_users.len(),
            "saved AFK data"
        );
        Ok(())
    }
}

/// Keeps nothing. Used for `--ephemeral` runs and tests.
#[derive(Debug, Default)]
pub struct NoPersistence;

impl Persistence for NoPersistence {
    fn load(&self) -> Snapshot {
        Snapshot::default()
    }

    fn save(&self, _snapshot: &Snapshot) -> Result<(), PersistError> {
        Ok(())
    }
}
