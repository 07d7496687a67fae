//! Fixtures shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use kindred_shared::types::{ChatId, Message, UserId};
use kindred_store::{Chat, ChatRecord, Database, Participant, Result, StoreError};

use crate::backend::{ChatBackend, SqliteBackend};
use crate::feed::{ChangeFeed, FeedFilter, Subscription};

/// A temp store with two profiles (`me`, `them`) sharing one chat.
pub struct Fixture {
    pub backend: SqliteBackend,
    pub me: UserId,
    pub them: UserId,
    pub chat: ChatId,
    _dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("sync.db")).unwrap();
        let backend = SqliteBackend::new(db, ChangeFeed::new(64));

        let me = backend.with_db(|db| Ok(add_profile(db, "Me"))).unwrap();
        let them = backend.with_db(|db| Ok(add_profile(db, "Them"))).unwrap();
        let chat = backend.with_db(|db| Ok(add_chat(db, &[me, them]))).unwrap();

        Self {
            backend,
            me,
            them,
            chat,
            _dir: dir,
        }
    }

    pub fn shared(&self) -> Arc<dyn ChatBackend> {
        Arc::new(self.backend.clone())
    }

    pub fn add_user(&self, name: &str) -> UserId {
        self.backend.with_db(|db| Ok(add_profile(db, name))).unwrap()
    }

    pub fn add_chat(&self, members: &[UserId]) -> ChatId {
        self.backend.with_db(|db| Ok(add_chat(db, members))).unwrap()
    }

    pub fn unread(&self, chat: ChatId, viewer: UserId) -> usize {
        self.backend.with_db(|db| db.unread_count(chat, viewer)).unwrap()
    }
}

fn add_profile(db: &Database, name: &str) -> UserId {
    let id = UserId::new();
    db.upsert_profile(&Participant {
        id,
        name: name.to_string(),
        avatar_url: None,
    })
    .unwrap();
    id
}

fn add_chat(db: &Database, members: &[UserId]) -> ChatId {
    let chat = Chat::new();
    db.create_chat(&chat).unwrap();
    for member in members {
        db.add_participant(chat.id, *member).unwrap();
    }
    chat.id
}

/// Wraps a [`SqliteBackend`] with switchable failures and call counters.
pub struct FlakyBackend {
    pub inner: SqliteBackend,
    pub fail_fetch: AtomicBool,
    pub fail_insert: AtomicBool,
    pub fail_mark_read: AtomicBool,
    pub inserts: AtomicUsize,
    pub mark_read_calls: AtomicUsize,
}

impl FlakyBackend {
    pub fn new(inner: SqliteBackend) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_fetch: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            fail_mark_read: AtomicBool::new(false),
            inserts: AtomicUsize::new(0),
            mark_read_calls: AtomicUsize::new(0),
        })
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("injected failure".into())
}

#[async_trait]
impl ChatBackend for FlakyBackend {
    async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.fetch_messages(chat_id).await
    }

    async fn insert_message(&self, chat_id: ChatId, sender_id: UserId, content: &str) -> Result<Message> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.insert_message(chat_id, sender_id, content).await
    }

    async fn mark_read(&self, chat_id: ChatId, user_id: UserId) -> Result<usize> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.mark_read(chat_id, user_id).await
    }

    async fn fetch_chats_for_user(&self, user_id: UserId) -> Result<Vec<ChatRecord>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.fetch_chats_for_user(user_id).await
    }

    fn subscribe(&self, filter: FeedFilter) -> Result<Subscription> {
        self.inner.subscribe(filter)
    }
}

/// Commits one message from `sender` while the first `fetch_messages` is in
/// flight, either before the snapshot is read or right after it.
pub struct RacingBackend {
    pub inner: SqliteBackend,
    pub sender: UserId,
    pub content: &'static str,
    pub before_snapshot: bool,
    fired: AtomicBool,
}

impl RacingBackend {
    pub fn new(inner: SqliteBackend, sender: UserId, content: &'static str, before_snapshot: bool) -> Arc<Self> {
        Arc::new(Self {
            inner,
            sender,
            content,
            before_snapshot,
            fired: AtomicBool::new(false),
        })
    }

    async fn commit_once(&self, chat_id: ChatId) -> Result<()> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.inner.insert_message(chat_id, self.sender, self.content).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for RacingBackend {
    async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>> {
        if self.before_snapshot {
            self.commit_once(chat_id).await?;
            self.inner.fetch_messages(chat_id).await
        } else {
            let snapshot = self.inner.fetch_messages(chat_id).await?;
            self.commit_once(chat_id).await?;
            Ok(snapshot)
        }
    }

    async fn insert_message(&self, chat_id: ChatId, sender_id: UserId, content: &str) -> Result<Message> {
        self.inner.insert_message(chat_id, sender_id, content).await
    }

    async fn mark_read(&self, chat_id: ChatId, user_id: UserId) -> Result<usize> {
        self.inner.mark_read(chat_id, user_id).await
    }

    async fn fetch_chats_for_user(&self, user_id: UserId) -> Result<Vec<ChatRecord>> {
        self.inner.fetch_chats_for_user(user_id).await
    }

    fn subscribe(&self, filter: FeedFilter) -> Result<Subscription> {
        self.inner.subscribe(filter)
    }
}

/// Wait (bounded) until the watched state satisfies `pred`.
pub async fn wait_until<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("view closed while waiting")
        .clone()
}
