use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use kindred_shared::constants::DEFAULT_PAGE_SIZE;
use kindred_shared::types::{ChatId, Message, MessageId, UserId};
use kindred_store::{Chat, Participant};
use kindred_sync::{
    ChatBackend, ChatListState, ConversationAggregator, ConversationThread, SendOutcome,
    SendPipeline, SqliteBackend,
};

#[derive(Parser)]
#[command(name = "kindred", version, about = "Kindred chat core harness")]
pub struct Cli {
    /// Path to the SQLite store (overrides KINDRED_DB_PATH)
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create two profiles and a chat between them
    Seed {
        #[arg(long, default_value = "Ada")]
        me: String,
        #[arg(long, default_value = "Bo")]
        them: String,
    },
    /// Print a user's chats, most recent first
    Chats {
        #[arg(long, value_parser = parse_user)]
        user: UserId,
    },
    /// Print one page of a chat's history, newest first
    History {
        #[arg(long, value_parser = parse_chat)]
        chat: ChatId,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Send one message
    Send {
        #[arg(long, value_parser = parse_user)]
        user: UserId,
        #[arg(long, value_parser = parse_chat)]
        chat: ChatId,
        content: String,
    },
    /// Open a chat: lines on stdin are sent, the thread is printed live
    Chat {
        #[arg(long, value_parser = parse_user)]
        user: UserId,
        #[arg(long, value_parser = parse_chat)]
        chat: ChatId,
    },
}

fn parse_user(s: &str) -> Result<UserId, String> {
    UserId::parse(s).map_err(|e| format!("invalid user id: {e}"))
}

fn parse_chat(s: &str) -> Result<ChatId, String> {
    ChatId::parse(s).map_err(|e| format!("invalid chat id: {e}"))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn seed(backend: &SqliteBackend, me: &str, them: &str) -> anyhow::Result<()> {
    let (me_id, them_id, chat) = backend.with_db(|db| {
        let me_id = UserId::new();
        let them_id = UserId::new();
        for (id, name) in [(me_id, me), (them_id, them)] {
            db.upsert_profile(&Participant {
                id,
                name: name.to_string(),
                avatar_url: None,
            })?;
        }
        let chat = Chat::new();
        db.create_chat(&chat)?;
        db.add_participant(chat.id, me_id)?;
        db.add_participant(chat.id, them_id)?;
        Ok((me_id, them_id, chat))
    })?;

    info!(chat = %chat.id, "seeded chat");
    println!("{me:<8} {me_id}");
    println!("{them:<8} {them_id}");
    println!("chat     {}", chat.id);
    Ok(())
}

pub async fn chats(backend: SqliteBackend, user: UserId) -> anyhow::Result<()> {
    let aggregator = ConversationAggregator::spawn(Arc::new(backend), user)?;
    let mut rx = aggregator.watch();
    let state = rx
        .wait_for(|s| !s.loading)
        .await
        .context("chat list closed before loading")?
        .clone();
    aggregator.close().await;

    print_chat_list(&state);
    match state.error {
        Some(e) => bail!(e),
        None => Ok(()),
    }
}

pub fn history(backend: &SqliteBackend, chat: ChatId, limit: u32, offset: u32) -> anyhow::Result<()> {
    let page = backend.with_db(|db| db.get_messages_for_chat(chat, limit, offset))?;
    if page.is_empty() {
        println!("(no messages)");
    }
    for message in &page {
        println!("{}", format_message(message));
    }
    Ok(())
}

pub async fn send(
    backend: SqliteBackend,
    user: UserId,
    chat: ChatId,
    content: &str,
    max_chars: usize,
) -> anyhow::Result<()> {
    check_draft(content, max_chars)?;
    let pipeline = SendPipeline::new(Arc::new(backend), user);
    match pipeline.send(chat, content).await {
        Ok(SendOutcome::Sent(id)) => {
            println!("sent {id}");
            Ok(())
        }
        Ok(SendOutcome::Skipped) => {
            println!("nothing to send");
            Ok(())
        }
        Err(e) => {
            eprintln!("draft kept: {content}");
            Err(e.into())
        }
    }
}

pub async fn chat(backend: SqliteBackend, user: UserId, chat: ChatId, max_chars: usize) -> anyhow::Result<()> {
    let shared: Arc<dyn ChatBackend> = Arc::new(backend);
    let thread = ConversationThread::open(shared.clone(), chat, user)?;
    let pipeline = SendPipeline::new(shared, user);

    let mut updates = thread.watch();
    let mut shown: HashSet<MessageId> = HashSet::new();
    let mut last_error: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                // Oldest first on a terminal.
                for message in state.messages.iter().rev() {
                    if shown.insert(message.id) {
                        println!("{}", format_message(message));
                    }
                }
                if state.error != last_error {
                    if let Some(e) = &state.error {
                        eprintln!("! {e}");
                    }
                    last_error = state.error;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Err(e) = check_draft(&line, max_chars) {
                    eprintln!("! {e}");
                    continue;
                }
                if let Err(e) = pipeline.send(chat, &line).await {
                    warn!(error = %e, "send failed");
                    eprintln!("! {e}\n  draft kept: {line}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, closing chat");
                break;
            }
        }
    }

    thread.close().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The compose box's length limit.  Counted in characters, not bytes.
fn check_draft(content: &str, max_chars: usize) -> anyhow::Result<()> {
    let len = content.chars().count();
    if len > max_chars {
        bail!("message too long: {len} characters (max {max_chars})");
    }
    Ok(())
}

fn format_message(message: &Message) -> String {
    format!(
        "[{}] {} {}{}",
        message.created_at.format("%H:%M"),
        message.sender_id.short(),
        message.content,
        if message.read { "" } else { " *" }
    )
}

fn print_chat_list(state: &ChatListState) {
    if state.chats.is_empty() {
        println!("(no chats)");
    }
    for summary in &state.chats {
        let names: Vec<&str> = summary.participants.iter().map(|p| p.name.as_str()).collect();
        let preview = summary
            .last_message
            .as_ref()
            .map(|m| m.content.as_str())
            .unwrap_or("No messages yet");
        let unread = match summary.unread_count {
            0 => String::new(),
            n => format!(" ({n})"),
        };
        println!("{}  {}{}: {}", summary.id, names.join(", "), unread, preview);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_limit_counts_characters() {
        assert!(check_draft(&"a".repeat(500), 500).is_ok());
        assert!(check_draft(&"a".repeat(501), 500).is_err());
        // Multi-byte characters count once each.
        assert!(check_draft(&"é".repeat(500), 500).is_ok());
    }

    #[test]
    fn cli_parses_send() {
        let user = UserId::new();
        let chat = ChatId::new();
        let cli = Cli::try_parse_from([
            "kindred",
            "send",
            "--user",
            &user.to_string(),
            "--chat",
            &chat.to_string(),
            "hello",
        ])
        .unwrap();
        match cli.command {
            Command::Send {
                user: u,
                chat: c,
                content,
            } => {
                assert_eq!((u, c, content.as_str()), (user, chat, "hello"));
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn cli_rejects_bad_ids() {
        assert!(Cli::try_parse_from(["kindred", "chats", "--user", "nope"]).is_err());
    }
}
