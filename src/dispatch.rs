//! Turn inbound events into AFK state changes and outbound notices.
//!
//! Commands (`/afk`, `/back`) mutate [`AfkState`]; plain messages are checked
//! for addressed AFK users. Every mutation is persisted inside `AfkState`
//! before the notices describing it are returned to the caller.

use chrono::Utc;
use std::sync::Arc;

use crate::afk::{format_since, AfkRecord, AfkState, UserId};
use crate::channels::{Author, ChannelEvent, InboundCommand, InboundMessage};
use crate::config::NotifyMode;
use crate::mentions::{resolve_addressed, MentionContext};

pub const HELP_TEXT: &str = "Hi! I keep track of who is away from keyboard.\n\
/afk [reason] - mark yourself as AFK\n\
/back - mark yourself as back online\n\
When someone replies to or mentions an AFK user, I'll let them know.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// Someone addressed an AFK user.
    Away { user_id: UserId },
    /// An AFK user came back.
    WelcomeBack { user_id: UserId },
    /// Direct answer to a command.
    CommandReply,
}

/// One outbound text, sent as a reply to the triggering message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    fn command_reply(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::CommandReply,
            text: text.into(),
        }
    }
}

pub struct Dispatcher {
    state: Arc<AfkState>,
    mode: NotifyMode,
}

impl Dispatcher {
    pub fn new(state: Arc<AfkState>, mode: NotifyMode) -> Self {
        Self { state, mode }
    }

    pub fn state(&self) -> &Arc<AfkState> {
        &self.state
    }

    pub fn handle_event(&self, event: &ChannelEvent) -> Vec<Notice> {
        match event {
            ChannelEvent::Command(command) => self.handle_command(command),
            ChannelEvent::Message(message) => self.handle_message(message),
        }
    }

    pub fn handle_command(&self, command: &InboundCommand) -> Vec<Notice> {
        match command.command.as_str() {
            "afk" => vec![self.set_afk(&command.author, &command.args)],
            "back" => vec![self.back(&command.author)],
            "start" | "help" => vec![Notice::command_reply(HELP_TEXT)],
            other => {
                tracing::debug!(command = other, "ignoring unknown command");
                Vec::new()
            }
        }
    }

    /// `/afk [reason]`
    pub fn set_afk(&self, author: &Author, reason: &str) -> Notice {
        let reason = reason.trim();
        let record = self.state.set_afk(
            author.id,
            &author.display_name,
            author.handle.as_deref(),
            (!reason.is_empty()).then_some(reason),
        );
        Notice::command_reply(format!(
            "{} is now AFK. Reason: {}",
            record.display_name, record.reason
        ))
    }

    /// `/back`
    pub fn back(&self, author: &Author) -> Notice {
        match self.state.clear_afk(author.id) {
            Some(record) => welcome_back(&author.display_name, &record),
            None => Notice::command_reply("You weren't AFK."),
        }
    }

    pub fn handle_message(&self, message: &InboundMessage) -> Vec<Notice> {
        if self.mode == NotifyMode::AutoReturn {
            if let Some(record) = self.state.clear_afk_if_present(message.author.id) {
                return vec![welcome_back(&message.author.display_name, &record)];
            }
        }

        let ctx = MentionContext {
            sender: message.author.id,
            text: &message.text,
            reply_to: message.reply_to,
            spans: &message.mentions,
        };
        let now = Utc::now();
        self.state.read(|book| {
            resolve_addressed(book, &ctx)
                .iter()
                .filter_map(|user_id| book.presence().get(user_id))
                .map(|record| away_notice(record, now))
                .collect()
        })
    }
}

fn away_notice(record: &AfkRecord, now: chrono::DateTime<Utc>) -> Notice {
    Notice {
        kind: NoticeKind::Away {
            user_id: record.user_id,
        },
        text: format!(
            "*{}* is AFK.\n*Reason:* {}\n*Since:* {} ago.",
            escape_markdown(&record.display_name),
            escape_markdown(&record.reason),
            format_since(record.since, now)
        ),
    }
}

fn welcome_back(display_name: &str, record: &AfkRecord) -> Notice {
    Notice {
        kind: NoticeKind::WelcomeBack {
            user_id: record.user_id,
        },
        text: format!(
            "Welcome back, {}! You were AFK for {}.\n*Reason:* {}",
            escape_markdown(display_name),
            format_since(record.since, Utc::now()),
            escape_markdown(&record.reason)
        ),
    }
}

/// Escape characters that Telegram's legacy Markdown treats as markup.
pub fn escape_markdown(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}
