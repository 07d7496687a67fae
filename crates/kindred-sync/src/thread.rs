//! Live history of one open conversation.
//!
//! The thread subscribes to its chat *before* fetching history, so any insert
//! committed while the fetch is in flight is already queued on the
//! subscription.  Once the fetch lands, queued events are applied on top of it
//! and anything the fetch already contained is dropped by id.  The same rule
//! absorbs duplicate deliveries from the at-least-once feed.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use kindred_shared::constants::MESSAGES_LOAD_ERROR;
use kindred_shared::protocol::{ChangeEvent, ChangeKind};
use kindred_shared::types::{ChatId, Message, MessageId, UserId};

use crate::backend::ChatBackend;
use crate::error::{Result, SyncError};
use crate::feed::{FeedFilter, FeedItem, Subscription};
use crate::read_tracking::ReadTracker;

/// Snapshot published by an open thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadState {
    /// Newest first.
    pub messages: Vec<Message>,
    pub loading: bool,
    /// User-facing message for the last failed load.
    pub error: Option<String>,
}

impl Default for ThreadState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            loading: true,
            error: None,
        }
    }
}

impl ThreadState {
    pub fn head(&self) -> Option<&Message> {
        self.messages.first()
    }
}

/// One open conversation.
///
/// Holds exactly one chat-scoped subscription.  [`close`](Self::close)
/// releases it before returning; dropping the handle only aborts the task,
/// and the subscription goes away once the runtime next polls it.
pub struct ConversationThread {
    chat_id: ChatId,
    state_rx: watch::Receiver<ThreadState>,
    reload_tx: mpsc::Sender<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConversationThread {
    /// Subscribe to `chat_id`, then load its history in the background.
    pub fn open(backend: Arc<dyn ChatBackend>, chat_id: ChatId, viewer: UserId) -> Result<Self> {
        let subscription = backend.subscribe(FeedFilter::Chat(chat_id))?;

        let (state_tx, state_rx) = watch::channel(ThreadState::default());
        let (reload_tx, reload_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let sync = ThreadSync {
            reader: ReadTracker::new(backend.clone(), viewer),
            backend,
            chat_id,
            viewer,
            messages: Vec::new(),
            seen: HashSet::new(),
            state_tx,
        };
        let task = tokio::spawn(sync.run(subscription, reload_rx, shutdown_rx));

        info!(chat = %chat_id, viewer = %viewer, "thread opened");

        Ok(Self {
            chat_id,
            state_rx,
            reload_tx,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Current snapshot.
    pub fn state(&self) -> ThreadState {
        self.state_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ThreadState> {
        self.state_rx.clone()
    }

    /// Snapshots as a stream, starting with the current one.
    pub fn stream(&self) -> WatchStream<ThreadState> {
        WatchStream::new(self.state_rx.clone())
    }

    /// Refetch history, e.g. after a failed load.
    pub fn reload(&self) -> Result<()> {
        match self.reload_tx.try_send(()) {
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
                    error!(chat = %self.chat_id, error = %e, "thread task panicked");
                }
            }
        }
        info!(chat = %self.chat_id, "thread closed");
    }
}

impl Drop for ConversationThread {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct ThreadSync {
    backend: Arc<dyn ChatBackend>,
    reader: ReadTracker,
    chat_id: ChatId,
    viewer: UserId,
    /// Newest first.
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
    state_tx: watch::Sender<ThreadState>,
}

impl ThreadSync {
    async fn run(
        mut self,
        mut subscription: Subscription,
        mut reload_rx: mpsc::Receiver<()>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut feed_open = true;

        tokio::select! {
            biased;
            _ = &mut shutdown_rx => return,
            _ = self.load() => {}
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                Some(()) = reload_rx.recv() => {
                    tokio::select! {
                        biased;
                        _ = &mut shutdown_rx => break,
                        _ = self.load() => {}
                    }
                }
                item = subscription.next(), if feed_open => match item {
                    Some(FeedItem::Change(event)) => {
                        tokio::select! {
                            biased;
                            _ = &mut shutdown_rx => break,
                            _ = self.apply(event) => {}
                        }
                    }
                    Some(FeedItem::Lagged(n)) => {
                        warn!(chat = %self.chat_id, skipped = n, "thread lagged, resyncing");
                        tokio::select! {
                            biased;
                            _ = &mut shutdown_rx => break,
                            _ = self.load() => {}
                        }
                    }
                    None => {
                        warn!(chat = %self.chat_id, "change feed closed");
                        feed_open = false;
                    }
                },
            }
        }

        debug!(chat = %self.chat_id, "thread task stopped");
    }

    /// Fetch the full history and replace the cache with it.  On failure the
    /// cache is kept as is and only the error is surfaced.
    async fn load(&mut self) {
        match self.backend.fetch_messages(self.chat_id).await {
            Ok(messages) => {
                debug!(chat = %self.chat_id, count = messages.len(), "thread loaded");
                self.seen = messages.iter().map(|m| m.id).collect();
                self.messages = messages;
                self.publish(None);
                self.reader.mark_read(self.chat_id).await;
            }
            Err(e) => {
                error!(chat = %self.chat_id, error = %e, "failed to fetch messages");
                self.publish(Some(MESSAGES_LOAD_ERROR.to_string()));
            }
        }
    }

    async fn apply(&mut self, event: ChangeEvent) {
        match event.kind {
            ChangeKind::Insert => {
                let remote = event.record.sender_id != self.viewer;
                if self.insert(event.record) {
                    self.publish_keep_error();
                    if remote {
                        self.reader.mark_read(self.chat_id).await;
                    }
                }
            }
            ChangeKind::Update => {
                if self.update(event.record) {
                    self.publish_keep_error();
                }
            }
        }
    }

    /// New messages go to the head; a late arrival with an older timestamp
    /// is slotted into place.  Returns `false` for an id already cached.
    fn insert(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id) {
            debug!(chat = %self.chat_id, message = %message.id, "duplicate insert ignored");
            return false;
        }
        let pos = self
            .messages
            .iter()
            .position(|m| m.created_at <= message.created_at)
            .unwrap_or(self.messages.len());
        self.messages.insert(pos, message);
        true
    }

    fn update(&mut self, record: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.id == record.id) {
            // `read` only ever goes false -> true.
            Some(existing) if record.read && !existing.read => {
                existing.read = true;
                true
            }
            _ => false,
        }
    }

    fn publish(&self, error: Option<String>) {
        self.state_tx.send_replace(ThreadState {
            messages: self.messages.clone(),
            loading: false,
            error,
        });
    }

    fn publish_keep_error(&self) {
        let error = self.state_tx.borrow().error.clone();
        self.publish(error);
    }
}
