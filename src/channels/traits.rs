use async_trait::async_trait;

use crate::afk::UserId;
use crate::mentions::MentionSpan;

/// The participant who sent an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub display_name: String,
    /// Handle used for `@handle` mentions, if the user has one.
    pub handle: Option<String>,
}

/// A plain (non-command) chat message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub author: Author,
    pub text: String,
    /// Author of the message this one replies to.
    pub reply_to: Option<UserId>,
    /// Mention annotations in the order they appear in `text`.
    pub mentions: Vec<MentionSpan>,
}

/// A `/command args...` message.
#[derive(Debug, Clone)]
pub struct InboundCommand {
    pub chat_id: i64,
    pub message_id: i64,
    pub author: Author,
    /// Command name without the leading `/` or `@botname` suffix, lower-cased.
    pub command: String,
    pub args: String,
}

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Message(InboundMessage),
    Command(InboundCommand),
}

impl ChannelEvent {
    pub fn chat_id(&self) -> i64 {
        match self {
            Self::Message(m) => m.chat_id,
            Self::Command(c) => c.chat_id,
        }
    }

    pub fn message_id(&self) -> i64 {
        match self {
            Self::Message(m) => m.message_id,
            Self::Command(c) => c.message_id,
        }
    }
}

/// Outbound text, sent as a reply to `reply_to_message_id` when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    pub chat_id: i64,
    pub reply_to_message_id: Option<i64>,
    pub content: String,
}

impl SendMessage {
    pub fn reply(chat_id: i64, message_id: i64, content: impl Into<String>) -> Self {
        Self {
            chat_id,
            reply_to_message_id: Some(message_id),
            content: content.into(),
        }
    }
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &SendMessage) -> anyhow::Result<()>;

    /// Receive events until `tx` is closed or the transport gives up.
    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelEvent>) -> anyhow::Result<()>;

    async fn health_check(&self) -> bool {
        true
    }
}
