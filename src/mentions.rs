//! Work out who a message is addressed to.
//!
//! A message addresses a user by replying to one of their messages, by an
//! entity mention that carries the user id directly, or by a textual
//! `@handle` that has to be looked up in the name index. Only users who are
//! currently AFK, other than the sender, are kept.

use std::collections::HashSet;

use crate::afk::{AfkBook, UserId};

/// A mention annotation attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionSpan {
    /// The transport already resolved the mention to a user.
    Direct(UserId),
    /// `@handle` text at `offset..offset + length`, measured in UTF-16 code
    /// units as Telegram reports entity positions.
    Handle { offset: usize, length: usize },
}

/// Identities addressed by one message, in first-seen order, without repeats.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Addressed {
    order: Vec<UserId>,
    seen: HashSet<UserId>,
}

impl Addressed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `user_id`. Returns `false` if it was already present.
    pub fn push(&mut self, user_id: UserId) -> bool {
        if self.seen.insert(user_id) {
            self.order.push(user_id);
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = UserId> + '_ {
        self.order.iter().copied()
    }
}

/// What the resolver needs to know about a message.
#[derive(Debug, Clone, Copy)]
pub struct MentionContext<'a> {
    pub sender: UserId,
    pub text: &'a str,
    /// Author of the message being replied to.
    pub reply_to: Option<UserId>,
    pub spans: &'a [MentionSpan],
}

/// Resolve every AFK user `ctx` addresses: reply target first, then spans in
/// order. The sender and users who are not AFK are skipped.
pub fn resolve_addressed(book: &AfkBook, ctx: &MentionContext<'_>) -> Addressed {
    let mut addressed = Addressed::new();

    let candidates = ctx
        .reply_to
        .into_iter()
        .chain(ctx.spans.iter().filter_map(|span| resolve_span(book, ctx.text, span)));

    for user_id in candidates {
        if user_id == ctx.sender || !book.presence().is_afk(user_id) {
            continue;
        }
        addressed.push(user_id);
    }

    addressed
}

fn resolve_span(book: &AfkBook, text: &str, span: &MentionSpan) -> Option<UserId> {
    match span {
        MentionSpan::Direct(user_id) => Some(*user_id),
        MentionSpan::Handle { offset, length } => {
            let Some(handle) = utf16_slice(text, *offset, *length) else {
                tracing::debug!(offset, length, "mention span outside message text");
                return None;
            };
            book.resolve_afk_handle(&handle)
        }
    }
}

/// Extract `length` UTF-16 code units starting at `offset`. Returns `None` if
/// the range runs past the end of `text` or splits a surrogate pair.
pub fn utf16_slice(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    let slice = units.get(offset..end)?;
    String::from_utf16(slice).ok()
}
