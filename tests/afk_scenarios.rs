//! End-to-end scenarios: events in through a scripted channel, replies out.

use afkwatch::afk::AfkState;
use afkwatch::bot::Bot;
use afkwatch::channels::{
    Author, Channel, ChannelEvent, InboundCommand, InboundMessage, SendMessage,
};
use afkwatch::config::NotifyMode;
use afkwatch::dispatch::Dispatcher;
use afkwatch::mentions::MentionSpan;
use afkwatch::persist::{JsonFile, Persistence};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Replays a fixed list of events, then stops; records everything sent.
struct ScriptedChannel {
    script: Mutex<Vec<ChannelEvent>>,
    sent: Mutex<Vec<SendMessage>>,
}

impl ScriptedChannel {
    fn new(script: Vec<ChannelEvent>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<SendMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, message: &SendMessage) -> anyhow::Result<()> {
        self.sent.lock().push(message.clone());
        Ok(())
    }

    async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelEvent>) -> anyhow::Result<()> {
        let events: Vec<_> = self.script.lock().drain(..).collect();
        for event in events {
            if tx.send(event).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn alice() -> Author {
    Author {
        id: 100,
        display_name: "Alice".into(),
        handle: Some("alice".into()),
    }
}

fn bob() -> Author {
    Author {
        id: 200,
        display_name: "Bob".into(),
        handle: Some("bob".into()),
    }
}

fn command(message_id: i64, author: Author, name: &str, args: &str) -> ChannelEvent {
    ChannelEvent::Command(InboundCommand {
        chat_id: -500,
        message_id,
        author,
        command: name.into(),
        args: args.into(),
    })
}

fn message(
    message_id: i64,
    author: Author,
    text: &str,
    reply_to: Option<i64>,
    mentions: Vec<MentionSpan>,
) -> ChannelEvent {
    ChannelEvent::Message(InboundMessage {
        chat_id: -500,
        message_id,
        author,
        text: text.into(),
        reply_to,
        mentions,
    })
}

fn bot_with(
    path: &Path,
    mode: NotifyMode,
    channel: Arc<ScriptedChannel>,
) -> (Bot, Arc<AfkState>) {
    let state = Arc::new(AfkState::restore(Box::new(JsonFile::new(path))));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&state), mode));
    (Bot::new(dispatcher, channel), state)
}

#[tokio::test]
async fn alice_goes_fishing_and_comes_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("afk_data.json");
    let channel = ScriptedChannel::new(Vec::new());
    let (bot, state) = bot_with(&path, NotifyMode::AutoReturn, Arc::clone(&channel));

    bot.handle(command(1, alice(), "afk", "gone fishing")).await.unwrap();
    let record = state.get(100).unwrap();
    assert_eq!(record.reason, "gone fishing");
    assert_eq!(record.display_name, "Alice");

    bot.handle(message(2, bob(), "hey", Some(100), vec![])).await.unwrap();

    bot.handle(message(3, alice(), "back now", None, vec![])).await.unwrap();
    assert!(!state.is_afk(100));

    let sent = channel.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].content, "Alice is now AFK. Reason: gone fishing");
    assert_eq!(sent[1].reply_to_message_id, Some(2));
    assert!(sent[1].content.contains("*Alice* is AFK."));
    assert!(sent[1].content.contains("gone fishing"));
    assert!(sent[1].content.contains("seconds ago."));
    assert_eq!(sent[2].reply_to_message_id, Some(3));
    assert!(sent[2].content.starts_with("Welcome back, Alice!"));
    assert!(sent[2].content.contains("gone fishing"));

    let saved = JsonFile::new(&path).load();
    assert!(saved.afk_users.is_empty());
    assert!(saved.username_to_id.is_empty());
}

#[tokio::test]
async fn cleared_handle_gets_no_stale_notification() {
    let dir = tempfile::tempdir().unwrap();
    let channel = ScriptedChannel::new(Vec::new());
    let path = dir.path().join("afk.json");
    let (bot, _state) = bot_with(&path, NotifyMode::Passive, Arc::clone(&channel));

    bot.handle(command(1, alice(), "afk", "")).await.unwrap();
    bot.handle(command(2, alice(), "back", "")).await.unwrap();
    bot.handle(message(
        3,
        bob(),
        "@alice you there?",
        None,
        vec![MentionSpan::Handle { offset: 0, length: 6 }],
    ))
    .await
    .unwrap();

    let sent = channel.sent();
    assert_eq!(sent.len(), 2, "got: {sent:?}");
    assert!(sent.iter().all(|m| m.reply_to_message_id != Some(3)));
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("afk.json");

    {
        let channel = ScriptedChannel::new(Vec::new());
        let (bot, _) = bot_with(&path, NotifyMode::Passive, channel);
        bot.handle(command(1, alice(), "afk", "vacation")).await.unwrap();
    }

    let channel = ScriptedChannel::new(Vec::new());
    let (bot, state) = bot_with(&path, NotifyMode::Passive, Arc::clone(&channel));
    assert!(state.is_afk(100));

    bot.handle(message(
        2,
        bob(),
        "ask @Alice",
        None,
        vec![MentionSpan::Handle { offset: 4, length: 6 }],
    ))
    .await
    .unwrap();
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].content.contains("vacation"));
}

#[tokio::test]
async fn run_drains_scripted_events_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let channel = ScriptedChannel::new(vec![
        command(1, alice(), "afk", "lunch"),
        command(2, bob(), "help", ""),
        command(3, bob(), "back", ""),
    ]);
    let path = dir.path().join("afk.json");
    let (bot, state) = bot_with(&path, NotifyMode::Passive, Arc::clone(&channel));

    bot.run(std::future::pending()).await.unwrap();

    assert!(state.is_afk(100));
    let replies: Vec<_> = channel
        .sent()
        .into_iter()
        .map(|m| m.reply_to_message_id)
        .collect();
    assert_eq!(replies, vec![Some(1), Some(2), Some(3)]);
    assert_eq!(channel.sent()[2].content, "You weren't AFK.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_applies_commands_in_arrival_order() {
    for round in 0..50 {
        let dir = tempfile::tempdir().unwrap();
        let channel = ScriptedChannel::new(vec![
            command(1, alice(), "afk", "one"),
            command(2, alice(), "back", ""),
            command(3, alice(), "afk", "two"),
            command(4, alice(), "back", ""),
        ]);
        let path = dir.path().join("afk.json");
        let (bot, state) = bot_with(&path, NotifyMode::AutoReturn, Arc::clone(&channel));

        bot.run(std::future::pending()).await.unwrap();

        assert!(!state.is_afk(100), "round {round}: still AFK after the last /back");
        let sent = channel.sent();
        let order: Vec<_> = sent.iter().map(|m| m.reply_to_message_id).collect();
        assert_eq!(order, vec![Some(1), Some(2), Some(3), Some(4)], "round {round}");
        assert!(sent[1].content.ends_with("*Reason:* one"));
        assert!(sent[3].content.ends_with("*Reason:* two"));
        assert!(JsonFile::new(&path).load().afk_users.is_empty());
    }
}
