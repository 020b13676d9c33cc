//! AFK presence engine: records, handle index and shared state.

pub mod duration;
pub mod names;
pub mod state;
pub mod store;

pub use duration::{format_duration, format_since};
pub use names::{normalize_handle, NameIndex};
pub use state::{AfkBook, AfkState};
pub use store::{AfkRecord, PresenceStore, NO_REASON};

/// Stable participant identifier (Telegram user id).
pub type UserId = i64;
