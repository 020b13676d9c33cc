//! afkwatch — AFK presence tracking for group chats.
//!
//! Users mark themselves away with `/afk [reason]`. When someone replies to
//! or mentions an away user, the bot answers with who is away, why, and for
//! how long.

pub mod afk;
pub mod bot;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod mentions;
pub mod persist;
