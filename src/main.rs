use afkwatch::afk::{format_since, AfkState, UserId};
use afkwatch::bot::{self, RunOptions};
use afkwatch::config::{Config, NotifyMode};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// AFK presence bot: tells a group when the person they address is away.
#[derive(Parser)]
#[command(name = "afkwatch", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Telegram bot.
    Run {
        /// Bot token (overrides config and AFKWATCH_BOT_TOKEN).
        #[arg(long)]
        token: Option<String>,

        /// AFK data file.
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Whether a message from an AFK user ends their AFK.
        #[arg(long, value_enum)]
        mode: Option<NotifyMode>,

        /// Keep AFK state in memory only.
        #[arg(long, conflicts_with = "data_file")]
        ephemeral: bool,
    },

    /// Print everyone currently marked AFK in the data file.
    List {
        #[arg(long)]
        data_file: Option<PathBuf>,
    },

    /// Clear a user's AFK record without going through chat.
    Clear {
        user_id: UserId,

        #[arg(long)]
        data_file: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "afkwatch=debug" } else { "afkwatch=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_state(config: &mut Config, data_file: Option<PathBuf>) -> AfkState {
    if let Some(path) = data_file {
        config.afk.data_file = Some(path);
    }
    AfkState::restore(bot::persistence_for(config, false))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Command::Run {
            token,
            data_file,
            mode,
            ephemeral,
        } => {
            bot::run(
                config,
                RunOptions {
                    token,
                    data_file,
                    mode,
                    ephemeral,
                },
            )
            .await
        }
        Command::List { data_file } => {
            let state = open_state(&mut config, data_file);
            let records = state.records();
            if records.is_empty() {
                println!("Nobody is AFK.");
                return Ok(());
            }
            let now = chrono::Utc::now();
            for record in records {
                println!(
                    "{:>12}  {:<20}  {:<16}  {} ago  {}",
                    record.user_id,
                    record.display_name,
                    record.handle.as_deref().map(|h| format!("@{h}")).unwrap_or_default(),
                    format_since(record.since, now),
                    record.reason
                );
            }
            Ok(())
        }
        Command::Clear { user_id, data_file } => {
            let state = open_state(&mut config, data_file);
            match state.clear_afk(user_id) {
                Some(record) => println!("Cleared {} ({user_id}).", record.display_name),
                None => println!("User {user_id} was not AFK."),
            }
            Ok(())
        }
    }
}
