//! The store boundary.
//!
//! [`ChatBackend`] is the contract every view is written against.
//! [`SqliteBackend`] implements it over a local [`Database`] and feeds its
//! own [`ChangeFeed`] on every committed write, the way a hosted store's
//! realtime channel would.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use kindred_shared::protocol::{ChangeEvent, ChangeKind};
use kindred_shared::types::{ChatId, Message, UserId};
use kindred_store::{ChatRecord, Database, Result, StoreError};

use crate::config::SyncConfig;
use crate::feed::{ChangeFeed, FeedFilter, Subscription};

/// Operations the sync core needs from the message store.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// A chat's whole history, newest first.
    async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>>;

    /// Append one message and return the committed row.
    async fn insert_message(&self, chat_id: ChatId, sender_id: UserId, content: &str) -> Result<Message>;

    /// Mark every unread message in the chat not sent by `user_id` as read.
    /// Idempotent; returns how many rows changed.
    async fn mark_read(&self, chat_id: ChatId, user_id: UserId) -> Result<usize>;

    /// Every chat `user_id` belongs to, with members and history.
    async fn fetch_chats_for_user(&self, user_id: UserId) -> Result<Vec<ChatRecord>>;

    /// Open a change subscription.  Dropping it cancels.
    fn subscribe(&self, filter: FeedFilter) -> Result<Subscription>;
}

/// [`ChatBackend`] over the local SQLite store.
#[derive(Clone)]
pub struct SqliteBackend {
    db: Arc<Mutex<Database>>,
    feed: ChangeFeed,
}

impl SqliteBackend {
    pub fn new(db: Database, feed: ChangeFeed) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            feed,
        }
    }

    /// Open the database named by `config` (or the platform default).
    pub fn open(config: &SyncConfig) -> Result<Self> {
        let db = match &config.db_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Database::open_at(path)?
            }
            None => Database::new()?,
        };
        info!(path = ?db.path(), capacity = config.feed_capacity, "message store ready");
        Ok(Self::new(db, ChangeFeed::new(config.feed_capacity)))
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Run a closure against the database under the connection lock.
    pub fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let guard = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&guard)
    }
}

#[async_trait]
impl ChatBackend for SqliteBackend {
    async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>> {
        self.with_db(|db| db.get_all_messages_for_chat(chat_id))
    }

    async fn insert_message(&self, chat_id: ChatId, sender_id: UserId, content: &str) -> Result<Message> {
        // Publish under the connection lock so the feed sees commits in order.
        self.with_db(|db| {
            let message = db.insert_message(chat_id, sender_id, content)?;
            let audience = db.participant_ids(chat_id)?;

            debug!(chat = %chat_id, message = %message.id, "message committed");
            self.feed.publish(ChangeEvent {
                kind: ChangeKind::Insert,
                record: message.clone(),
                audience,
            });
            Ok(message)
        })
    }

    async fn mark_read(&self, chat_id: ChatId, user_id: UserId) -> Result<usize> {
        self.with_db(|db| {
            let flipped = db.mark_messages_as_read(chat_id, user_id)?;
            if flipped.is_empty() {
                return Ok(0);
            }
            let audience = db.participant_ids(chat_id)?;

            let count = flipped.len();
            for record in flipped {
                self.feed.publish(ChangeEvent {
                    kind: ChangeKind::Update,
                    record,
                    audience: audience.clone(),
                });
            }
            Ok(count)
        })
    }

    async fn fetch_chats_for_user(&self, user_id: UserId) -> Result<Vec<ChatRecord>> {
        self.with_db(|db| db.fetch_chats_for_user(user_id))
    }

    fn subscribe(&self, filter: FeedFilter) -> Result<Subscription> {
        Ok(self.feed.subscribe(filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedItem;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn insert_publishes_to_chat_and_members() {
        let fx = Fixture::new();
        let mut chat_sub = fx.backend.subscribe(FeedFilter::Chat(fx.chat)).unwrap();
        let mut member_sub = fx.backend.subscribe(FeedFilter::Participant(fx.me)).unwrap();
        let mut outsider_sub = fx.backend.subscribe(FeedFilter::Participant(UserId::new())).unwrap();

        let sent = fx.backend.insert_message(fx.chat, fx.them, "hi").await.unwrap();

        match chat_sub.next().await {
            Some(FeedItem::Change(ev)) => {
                assert_eq!(ev.kind, ChangeKind::Insert);
                assert_eq!(ev.record, sent);
            }
            other => panic!("unexpected feed item: {other:?}"),
        }
        assert!(matches!(member_sub.next().await, Some(FeedItem::Change(_))));
        assert_eq!(outsider_sub.try_next(), None);
    }

    #[tokio::test]
    async fn mark_read_publishes_updates_once() {
        let fx = Fixture::new();
        fx.backend.insert_message(fx.chat, fx.them, "one").await.unwrap();
        fx.backend.insert_message(fx.chat, fx.them, "two").await.unwrap();

        let mut sub = fx.backend.subscribe(FeedFilter::Chat(fx.chat)).unwrap();
        assert_eq!(fx.backend.mark_read(fx.chat, fx.me).await.unwrap(), 2);
        assert_eq!(fx.backend.mark_read(fx.chat, fx.me).await.unwrap(), 0);

        let mut updates = 0;
        while let Some(FeedItem::Change(ev)) = sub.try_next() {
            assert_eq!(ev.kind, ChangeKind::Update);
            assert!(ev.record.read);
            updates += 1;
        }
        assert_eq!(updates, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_are_published_in_commit_order() {
        let fx = Fixture::new();
        let mut sub = fx.backend.subscribe(FeedFilter::Chat(fx.chat)).unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let backend = fx.backend.clone();
            let (chat, sender) = (fx.chat, if i % 2 == 0 { fx.me } else { fx.them });
            tasks.push(tokio::spawn(async move {
                backend.insert_message(chat, sender, &format!("m{i}")).await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut published = Vec::new();
        while let Some(FeedItem::Change(ev)) = sub.try_next() {
            published.push(ev.record.created_at);
        }
        assert_eq!(published.len(), 20);
        assert!(published.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig {
            db_path: Some(dir.path().join("nested").join("kindred.db")),
            ..SyncConfig::default()
        };
        let backend = SqliteBackend::open(&config).unwrap();
        assert!(backend.with_db(|db| Ok(db.path().is_some())).unwrap());
    }
}
