//! Event loop: receive from the channel, dispatch, send the notices back.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::afk::AfkState;
use crate::channels::{Channel, ChannelEvent, SendMessage, TelegramChannel};
use crate::config::{Config, NotifyMode};
use crate::dispatch::Dispatcher;
use crate::persist::{JsonFile, NoPersistence, Persistence};

/// Bound on events buffered between the listener and the dispatcher.
const EVENT_BUFFER: usize = 100;

pub struct Bot {
    dispatcher: Arc<Dispatcher>,
    channel: Arc<dyn Channel>,
}

impl Bot {
    pub fn new(dispatcher: Arc<Dispatcher>, channel: Arc<dyn Channel>) -> Self {
        Self {
            dispatcher,
            channel,
        }
    }

    /// Handle a single event and send every resulting notice as a reply.
    pub async fn handle(&self, event: ChannelEvent) -> Result<()> {
        handle_event(Arc::clone(&self.dispatcher), Arc::clone(&self.channel), event).await
    }

    /// Listen until the channel stops or `shutdown` resolves.
    ///
    /// Events are handled one at a time in the order the channel delivered
    /// them, so a user's `/afk` and `/back` always apply in sequence.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

        let channel = Arc::clone(&self.channel);
        let listener = tokio::spawn(async move { channel.listen(tx).await });

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        tracing::info!("{} listener stopped", self.channel.name());
                        break;
                    };
                    let chat_id = event.chat_id();
                    if let Err(e) = self.handle(event).await {
                        tracing::error!(chat_id, "failed to handle event: {e:#}");
                    }
                }
            }
        }

        listener.abort();
        Ok(())
    }
}

async fn handle_event(
    dispatcher: Arc<Dispatcher>,
    channel: Arc<dyn Channel>,
    event: ChannelEvent,
) -> Result<()> {
    let chat_id = event.chat_id();
    let message_id = event.message_id();

    // Dispatch may write the data file; keep that off the async workers.
    let notices = tokio::task::spawn_blocking(move || dispatcher.handle_event(&event))
        .await
        .context("dispatch task failed")?;

    for notice in notices {
        channel
            .send(&SendMessage::reply(chat_id, message_id, notice.text))
            .await
            .with_context(|| format!("failed to send reply to chat {chat_id}"))?;
    }
    Ok(())
}

/// Overrides applied on top of the loaded config.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    pub token: Option<String>,
    pub data_file: Option<std::path::PathBuf>,
    pub mode: Option<NotifyMode>,
    /// Keep state in memory only.
    pub ephemeral: bool,
}

/// Build the persistence backend selected by `config` and `opts`.
pub fn persistence_for(config: &Config, ephemeral: bool) -> Box<dyn Persistence> {
    if ephemeral {
        tracing::warn!("running without persistence; AFK state is lost on exit");
        Box::new(NoPersistence)
    } else {
        Box::new(JsonFile::new(config.data_file()))
    }
}

/// Start the Telegram bot and run until Ctrl-C.
pub async fn run(mut config: Config, opts: RunOptions) -> Result<()> {
    if let Some(token) = opts.token {
        config.telegram.bot_token = Some(token);
    }
    if let Some(path) = opts.data_file {
        config.afk.data_file = Some(path);
    }
    if let Some(mode) = opts.mode {
        config.afk.mode = mode;
    }

    let token = config.bot_token()?.to_string();
    let state = Arc::new(AfkState::restore(persistence_for(&config, opts.ephemeral)));
    let dispatcher = Arc::new(Dispatcher::new(state, config.afk.mode));

    let channel = TelegramChannel::new(
        token,
        config.telegram.api_base.clone(),
        config.telegram.poll_timeout_secs,
    )?;
    if !channel.health_check().await {
        tracing::warn!("Telegram getMe failed; continuing, polling will retry");
    }

    tracing::info!(
        mode = ?config.afk.mode,
        data_file = %config.data_file().display(),
        "afkwatch is running"
    );

    let bot = Bot::new(dispatcher, Arc::new(channel));
    bot.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await
}
