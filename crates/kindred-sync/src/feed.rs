//! In-process change feed.
//!
//! Every committed insert or update on `messages` is broadcast to all live
//! [`Subscription`]s.  A subscription only yields the events its
//! [`FeedFilter`] admits and unsubscribes itself when dropped, so a view that
//! owns exactly one `Subscription` holds exactly one listener.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use kindred_shared::error::ProtocolError;
use kindred_shared::protocol::{ChangeEvent, RawChange};
use kindred_shared::types::{ChatId, UserId};

/// Which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFilter {
    /// Every event on one chat.
    Chat(ChatId),
    /// Every event on any chat the user is a member of.
    Participant(UserId),
}

impl FeedFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            FeedFilter::Chat(chat_id) => event.record.chat_id == *chat_id,
            FeedFilter::Participant(user_id) => event.audience.contains(user_id),
        }
    }
}

/// Item yielded by [`Subscription::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Change(ChangeEvent),
    /// The subscriber fell behind and `n` events were dropped.  Local state
    /// must be reconciled by refetching.
    Lagged(u64),
}

/// Publishing side of the feed.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Broadcast an event.  Returns how many subscribers were live.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        debug!(
            kind = ?event.kind,
            chat = %event.record.chat_id,
            message = %event.record.id,
            "publishing change"
        );
        // No receivers is not an error: nobody is looking.
        self.tx.send(event).unwrap_or(0)
    }

    /// Validate a raw realtime payload and broadcast it.
    ///
    /// Malformed rows are logged and rejected; they never reach subscribers.
    pub fn publish_raw(&self, payload: &str, audience: Vec<UserId>) -> Result<usize, ProtocolError> {
        let event = RawChange::parse(payload)
            .and_then(|raw| raw.into_event(audience))
            .map_err(|e| {
                warn!(error = %e, "dropping malformed change payload");
                e
            })?;
        Ok(self.publish(event))
    }

    pub fn subscribe(&self, filter: FeedFilter) -> Subscription {
        debug!(?filter, "opening feed subscription");
        Subscription {
            filter,
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving side of the feed, scoped by a [`FeedFilter`].
#[derive(Debug)]
pub struct Subscription {
    filter: FeedFilter,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn filter(&self) -> FeedFilter {
        self.filter
    }

    /// Wait for the next matching item.  `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<FeedItem> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(FeedItem::Change(event)),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!(filter = ?self.filter, skipped = n, "feed subscriber lagged");
                    return Some(FeedItem::Lagged(n));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`next`](Self::next); `None` when nothing
    /// matching is queued right now.
    pub fn try_next(&mut self) -> Option<FeedItem> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(FeedItem::Change(event)),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(n)) => return Some(FeedItem::Lagged(n)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(filter = ?self.filter, "feed subscription released");
    }
}
