//! # kindred
//!
//! Operator harness for the Kindred chat core.  It drives the same
//! aggregator, thread, read-tracking and send components the mobile client
//! uses, against the local SQLite store:
//! - `seed` creates two profiles and a chat between them
//! - `chats` prints a user's chat list with unread counts
//! - `history` pages through a chat's messages
//! - `send` posts one message
//! - `chat` opens a conversation interactively (stdin in, live thread out)

mod commands;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kindred_shared::constants::APP_NAME;
use kindred_sync::{SqliteBackend, SyncConfig};

use crate::commands::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kindred_sync=debug,kindred_store=info,warn")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let mut config = SyncConfig::from_env();
    if let Some(path) = cli.db.clone() {
        config.db_path = Some(path);
    }
    info!(?config, "Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 3. Open the store and run the command
    // -----------------------------------------------------------------------
    let backend = SqliteBackend::open(&config)?;

    match cli.command {
        Command::Seed { me, them } => commands::seed(&backend, &me, &them),
        Command::Chats { user } => commands::chats(backend, user).await,
        Command::History {
            chat,
            limit,
            offset,
        } => commands::history(&backend, chat, limit, offset),
        Command::Send {
            user,
            chat,
            content,
        } => commands::send(backend, user, chat, &content, config.max_message_chars).await,
        Command::Chat { user, chat } => {
            commands::chat(backend, user, chat, config.max_message_chars).await
        }
    }
}
