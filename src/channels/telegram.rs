use super::traits::{Author, Channel, ChannelEvent, InboundCommand, InboundMessage, SendMessage};
use crate::mentions::MentionSpan;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Telegram rejects messages over 4096 characters; stay below it.
const MAX_MESSAGE_LEN: usize = 4000;

/// Pause after a failed `getUpdates` before polling again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram Bot API channel — `getUpdates` long polling and `sendMessage`.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

// ── Bot API payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
    #[serde(default)]
    entities: Vec<TgEntity>,
    reply_to_message: Option<Box<TgMessage>>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgEntity {
    #[serde(rename = "type")]
    kind: String,
    offset: usize,
    length: usize,
    user: Option<TgUser>,
}

impl TelegramChannel {
    pub fn new(bot_token: String, api_base: String, poll_timeout_secs: u64) -> Result<Self> {
        // The HTTP timeout must outlast the long-poll window.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build Telegram HTTP client")?;

        Ok(Self {
            bot_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            poll_timeout_secs,
            client,
        })
    }

    /// Request URL for `method`. It embeds the bot token, so errors from
    /// requests to it go through `without_url` before being returned or logged.
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>> {
        let resp = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout_secs.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let body: TgResponse<Vec<TgUpdate>> =
            resp.json().await.map_err(reqwest::Error::without_url)?;
        if !body.ok {
            bail!(
                "Telegram getUpdates failed: {}",
                body.description.unwrap_or_default()
            );
        }
        Ok(body.result.unwrap_or_default())
    }

    /// Send one chunk, retrying as plain text if Telegram rejects the Markdown.
    async fn send_chunk(&self, message: &SendMessage, chunk: &str, reply: bool) -> Result<()> {
        let mut payload = serde_json::json!({
            "chat_id": message.chat_id,
            "text": chunk,
            "parse_mode": "Markdown",
        });
        if let (true, Some(reply_to)) = (reply, message.reply_to_message_id) {
            payload["reply_to_message_id"] = serde_json::json!(reply_to);
            payload["allow_sending_without_reply"] = serde_json::json!(true);
        }

        let body: TgResponse<serde_json::Value> = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        if body.ok {
            return Ok(());
        }

        tracing::debug!(
            chat_id = message.chat_id,
            "Telegram: Markdown send rejected ({}), retrying as plain text",
            body.description.as_deref().unwrap_or("no description")
        );
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("parse_mode");
        }
        let body: TgResponse<serde_json::Value> = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;
        if !body.ok {
            bail!(
                "Telegram sendMessage failed: {}",
                body.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}

/// Convert a Telegram message into a channel event. Messages without text or
/// sender, and messages from bots, produce nothing.
fn parse_message(msg: &TgMessage) -> Option<ChannelEvent> {
    let raw = msg.text.as_deref()?;
    if raw.trim().is_empty() {
        return None;
    }
    let user = msg.from.as_ref()?;
    if user.is_bot {
        return None;
    }

    let author = Author {
        id: user.id,
        display_name: user.first_name.clone(),
        handle: user.username.clone().filter(|u| !u.is_empty()),
    };

    if let Some(rest) = raw.trim().strip_prefix('/') {
        let (command, args) = match rest.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd, args.trim()),
            None => (rest, ""),
        };
        // "/afk@mybot" addresses a specific bot in groups.
        let command = command.split('@').next().unwrap_or(command);
        return Some(ChannelEvent::Command(InboundCommand {
            chat_id: msg.chat.id,
            message_id: msg.message_id,
            author,
            command: command.to_lowercase(),
            args: args.to_string(),
        }));
    }

    // Entity offsets refer to the untrimmed text.
    let mentions = msg
        .entities
        .iter()
        .filter_map(|entity| match entity.kind.as_str() {
            "text_mention" => entity.user.as_ref().map(|u| MentionSpan::Direct(u.id)),
            "mention" => Some(MentionSpan::Handle {
                offset: entity.offset,
                length: entity.length,
            }),
            _ => None,
        })
        .collect();

    Some(ChannelEvent::Message(InboundMessage {
        chat_id: msg.chat.id,
        message_id: msg.message_id,
        author,
        text: raw.to_string(),
        reply_to: msg
            .reply_to_message
            .as_ref()
            .and_then(|r| r.from.as_ref())
            .map(|u| u.id),
        mentions,
    }))
}

/// Split on newlines where possible so each chunk fits `MAX_MESSAGE_LEN` bytes.
fn chunk_message(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > MAX_MESSAGE_LEN {
        let mut limit = MAX_MESSAGE_LEN;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let split_at = remaining[..limit].rfind('\n').filter(|&i| i > 0).unwrap_or(limit);
        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        remaining = rest.strip_prefix('\n').unwrap_or(rest);
    }
    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining);
    }
    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &SendMessage) -> Result<()> {
        for (i, chunk) in chunk_message(&message.content).into_iter().enumerate() {
            self.send_chunk(message, chunk, i == 0).await?;
        }
        Ok(())
    }

    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelEvent>) -> Result<()> {
        let mut offset: i64 = 0;
        tracing::info!("Telegram: polling for updates...");

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);

                let Some(msg) = update.message else {
                    tracing::debug!(
                        update_id = update.update_id,
                        "Telegram: skipping non-message update"
                    );
                    continue;
                };

                if let Some(event) = parse_message(&msg) {
                    if tx.send(event).await.is_err() {
                        // Receiver dropped: the bot is shutting down.
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn health_check(&self) -> bool {
        let resp = match self.client.get(self.api_url("getMe")).send().await {
            Ok(r) => r,
            Err(e) => {
                let e = e.without_url();
                tracing::warn!("Telegram health_check connection failed: {e}");
                return false;
            }
        };
        match resp.json::<TgResponse<serde_json::Value>>().await {
            Ok(body) => body.ok,
            Err(e) => {
                let e = e.without_url();
                tracing::warn!("Telegram health_check: response is not valid JSON: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Option<ChannelEvent> {
        let msg: TgMessage = serde_json::from_value(value).unwrap();
        parse_message(&msg)
    }

    fn alice() -> serde_json::Value {
        json!({ "id": 100, "is_bot": false, "first_name": "Alice", "username": "alice" })
    }

    #[test]
    fn parses_afk_command_with_reason() {
        let event = parse(json!({
            "message_id": 1,
            "chat": { "id": -42 },
            "from": alice(),
            "text": "/afk gone fishing"
        }))
        .unwrap();
        match event {
            ChannelEvent::Command(cmd) => {
                assert_eq!(cmd.command, "afk");
                assert_eq!(cmd.args, "gone fishing");
                assert_eq!(cmd.author.id, 100);
                assert_eq!(cmd.author.handle.as_deref(), Some("alice"));
                assert_eq!(cmd.chat_id, -42);
            }
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn strips_bot_suffix_and_lowercases_command() {
        let event = parse(json!({
            "message_id": 1,
            "chat": { "id": -42 },
            "from": alice(),
            "text": "/Back@AfkWatchBot"
        }))
        .unwrap();
        match event {
            ChannelEvent::Command(cmd) => {
                assert_eq!(cmd.command, "back");
                assert_eq!(cmd.args, "");
            }
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn parses_reply_and_mentions() {
        let event = parse(json!({
            "message_id": 7,
            "chat": { "id": -42 },
            "from": { "id": 200, "first_name": "Bob" },
            "text": "hey @alice and Carol",
            "entities": [
                { "type": "mention", "offset": 4, "length": 6 },
                { "type": "bold", "offset": 0, "length": 3 },
                { "type": "text_mention", "offset": 15, "length": 5,
                  "user": { "id": 300, "first_name": "Carol" } }
            ],
            "reply_to_message": {
                "message_id": 3,
                "chat": { "id": -42 },
                "from": alice(),
                "text": "earlier"
            }
        }))
        .unwrap();
        match event {
            ChannelEvent::Message(msg) => {
                assert_eq!(msg.reply_to, Some(100));
                assert_eq!(
                    msg.mentions,
                    vec![
                        MentionSpan::Handle { offset: 4, length: 6 },
                        MentionSpan::Direct(300)
                    ]
                );
                assert_eq!(msg.author.handle, None);
                assert_eq!(msg.message_id, 7);
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn ignores_empty_senderless_and_bot_messages() {
        assert!(parse(json!({
            "message_id": 1,
            "chat": { "id": 1 },
            "from": alice(),
            "text": "  "
        }))
        .is_none());
        assert!(parse(json!({ "message_id": 1, "chat": { "id": 1 }, "from": alice() })).is_none());
        assert!(parse(json!({ "message_id": 1, "chat": { "id": 1 }, "text": "hi" })).is_none());
        assert!(parse(json!({
            "message_id": 1,
            "chat": { "id": 1 },
            "from": { "id": 9, "is_bot": true, "first_name": "Bot" },
            "text": "hi"
        }))
        .is_none());
    }

    #[test]
    fn update_envelope_deserializes() {
        let body: TgResponse<Vec<TgUpdate>> = serde_json::from_value(json!({
            "ok": true,
            "result": [
                {
                    "update_id": 10,
                    "message": { "message_id": 1, "chat": { "id": 1 }, "text": "x" }
                },
                { "update_id": 11, "edited_message": {} }
            ]
        }))
        .unwrap();
        let updates = body.result.unwrap();
        assert_eq!(updates.len(), 2);
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn chunk_short_message() {
        assert_eq!(chunk_message("hello"), vec!["hello"]);
    }

    #[test]
    fn chunk_long_message_on_newlines() {
        let line = "x".repeat(100);
        let text = vec![line.as_str(); 50].join("\n");
        let chunks = chunk_message(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_LEN));
        assert_eq!(chunks.concat().len() + chunks.len() - 1, text.len());
    }

    #[test]
    fn chunk_respects_char_boundaries() {
        let text = "é".repeat(MAX_MESSAGE_LEN);
        let chunks = chunk_message(&text);
        assert!(chunks.iter().all(|c| c.len() <= MAX_MESSAGE_LEN));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn api_url_trims_trailing_slash() {
        let ch =
            TelegramChannel::new("123:abc".into(), "http://localhost:8081/".into(), 30).unwrap();
        assert_eq!(ch.api_url("getMe"), "http://localhost:8081/bot123:abc/getMe");
        assert_eq!(ch.name(), "telegram");
    }

    fn unreachable_channel() -> TelegramChannel {
        // Port 9 (discard) has nothing listening on loopback.
        TelegramChannel::new("123456:SECRET_TOKEN".into(), "http://127.0.0.1:9".into(), 1)
            .unwrap()
    }

    #[tokio::test]
    async fn poll_error_does_not_leak_token() {
        let err = unreachable_channel().get_updates(0).await.unwrap_err();
        let rendered = format!("{err:#} {err:?}");
        assert!(!rendered.contains("SECRET_TOKEN"), "token leaked: {rendered}");
    }

    #[tokio::test]
    async fn send_error_does_not_leak_token() {
        let err = unreachable_channel()
            .send(&SendMessage::reply(1, 2, "hi".to_string()))
            .await
            .unwrap_err();
        let rendered = format!("{err:#} {err:?}");
        assert!(!rendered.contains("SECRET_TOKEN"), "token leaked: {rendered}");
    }

    #[tokio::test]
    async fn health_check_fails_on_unreachable_api() {
        assert!(!unreachable_channel().health_check().await);
    }
}
