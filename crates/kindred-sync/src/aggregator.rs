//! Chat list aggregation.
//!
//! A [`ConversationAggregator`] owns one background task and one user-scoped
//! feed subscription.  Whenever anything changes in one of the user's chats
//! it refetches the user's chats and recomputes every [`ChatSummary`].  Full
//! recomputation is deliberate: it costs a round trip per change burst but
//! can never drift from the store.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use kindred_shared::constants::CHATS_LOAD_ERROR;
use kindred_shared::types::{ChatId, Message, UserId};
use kindred_store::{ChatRecord, Participant};

use crate::backend::ChatBackend;
use crate::error::{Result, SyncError};
use crate::feed::{FeedFilter, FeedItem, Subscription};

/// One row of the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: ChatId,
    /// Everyone in the chat except the viewer.
    pub participants: Vec<Participant>,
    /// `None` for a chat nobody has written in yet.
    pub last_message: Option<Message>,
    /// Messages from others the viewer has not read.
    pub unread_count: usize,
    /// Time of the last message, or of the chat's last update if empty.
    pub last_activity: DateTime<Utc>,
}

impl ChatSummary {
    pub fn from_record(record: ChatRecord, viewer: UserId) -> Self {
        let participants = record
            .participants
            .into_iter()
            .filter(|p| p.id != viewer)
            .collect();

        let unread_count = record
            .messages
            .iter()
            .filter(|m| m.is_unread_for(viewer))
            .count();

        let last_message = record.messages.into_iter().max_by_key(|m| m.created_at);
        let last_activity = last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(record.chat.updated_at);

        Self {
            id: record.chat.id,
            participants,
            last_message,
            unread_count,
            last_activity,
        }
    }
}

/// Build the ordered chat list for `viewer`, most recent activity first.
pub fn summarize(records: Vec<ChatRecord>, viewer: UserId) -> Vec<ChatSummary> {
    let mut chats: Vec<ChatSummary> = records
        .into_iter()
        .map(|record| ChatSummary::from_record(record, viewer))
        .collect();
    chats.sort_by_key(|c| (Reverse(c.last_activity), c.id));
    chats
}

/// Snapshot published by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatListState {
    pub chats: Vec<ChatSummary>,
    pub loading: bool,
    /// User-facing message for the last failed load.
    pub error: Option<String>,
}

impl Default for ChatListState {
    fn default() -> Self {
        Self {
            chats: Vec::new(),
            loading: true,
            error: None,
        }
    }
}

impl ChatListState {
    pub fn get(&self, id: ChatId) -> Option<&ChatSummary> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn total_unread(&self) -> usize {
        self.chats.iter().map(|c| c.unread_count).sum()
    }
}

/// Live chat list for one user.
///
/// Call [`close`](Self::close) on teardown: it releases the subscription
/// before returning.  Dropping the handle only aborts the task, so the
/// subscription goes away once the runtime next polls it.
pub struct ConversationAggregator {
    viewer: UserId,
    state_rx: watch::Receiver<ChatListState>,
    refresh_tx: mpsc::Sender<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConversationAggregator {
    /// Subscribe to the viewer's chats and start the first load.
    pub fn spawn(backend: Arc<dyn ChatBackend>, viewer: UserId) -> Result<Self> {
        let subscription = backend.subscribe(FeedFilter::Participant(viewer))?;

        let (state_tx, state_rx) = watch::channel(ChatListState::default());
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = Worker {
            backend,
            viewer,
            state_tx,
        };
        let task = tokio::spawn(worker.run(subscription, refresh_rx, shutdown_rx));

        info!(viewer = %viewer, "chat list opened");

        Ok(Self {
            viewer,
            state_rx,
            refresh_tx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    /// Current snapshot.
    pub fn state(&self) -> ChatListState {
        self.state_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ChatListState> {
        self.state_rx.clone()
    }

    /// Snapshots as a stream, starting with the current one.
    pub fn stream(&self) -> WatchStream<ChatListState> {
        WatchStream::new(self.state_rx.clone())
    }

    /// Ask for a refetch, e.g. after a failed load.
    pub fn refresh(&self) -> Result<()> {
        match self.refresh_tx.try_send(()) {
            // A refresh already queued covers this one.
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SyncError::Closed),
        }
    }

    /// Release the subscription and wait for the task to finish.  No state
    /// is published after this returns.
    pub async fn close(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(error = %e, "chat list task panicked");
                }
            }
        }
        info!(viewer = %self.viewer, "chat list closed");
    }
}

impl Drop for ConversationAggregator {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Worker {
    backend: Arc<dyn ChatBackend>,
    viewer: UserId,
    state_tx: watch::Sender<ChatListState>,
}

impl Worker {
    async fn run(
        self,
        mut subscription: Subscription,
        mut refresh_rx: mpsc::Receiver<()>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut loaded_once = false;
        let mut feed_open = true;

        tokio::select! {
            biased;
            _ = &mut shutdown_rx => return,
            _ = self.recompute(&mut loaded_once) => {}
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                Some(()) = refresh_rx.recv() => {
                    debug!(viewer = %self.viewer, "manual refresh");
                }
                item = subscription.next(), if feed_open => match item {
                    Some(item) => {
                        let coalesced = drain(&mut subscription);
                        if let FeedItem::Lagged(n) = item {
                            warn!(viewer = %self.viewer, skipped = n, "chat list lagged, resyncing");
                        }
                        debug!(viewer = %self.viewer, coalesced, "change received, recomputing chat list");
                    }
                    None => {
                        warn!(viewer = %self.viewer, "change feed closed");
                        feed_open = false;
                        continue;
                    }
                },
            }

            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = self.recompute(&mut loaded_once) => {}
            }
        }

        debug!(viewer = %self.viewer, "chat list task stopped");
    }

    async fn recompute(&self, loaded_once: &mut bool) {
        match self.backend.fetch_chats_for_user(self.viewer).await {
            Ok(records) => {
                let chats = summarize(records, self.viewer);
                debug!(viewer = %self.viewer, count = chats.len(), "chat list recomputed");
                self.state_tx.send_replace(ChatListState {
                    chats,
                    loading: false,
                    error: None,
                });
                *loaded_once = true;
            }
            Err(e) => {
                error!(viewer = %self.viewer, error = %e, "failed to fetch chats");
                let first_load = !*loaded_once;
                self.state_tx.send_modify(|state| {
                    // A failed first load shows an empty list; later failures
                    // keep the last good list under the error banner.
                    if first_load {
                        state.chats.clear();
                    }
                    state.loading = false;
                    state.error = Some(CHATS_LOAD_ERROR.to_string());
                });
            }
        }
    }
}

/// Swallow everything already queued; one recompute covers it all.
fn drain(subscription: &mut Subscription) -> usize {
    let mut n = 0;
    while subscription.try_next().is_some() {
        n += 1;
    }
    n
}
