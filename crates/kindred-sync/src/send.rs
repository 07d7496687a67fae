//! Outgoing messages.

use std::sync::Arc;

use tracing::{debug, info, warn};

use kindred_shared::types::{ChatId, MessageId, UserId};

use crate::backend::ChatBackend;
use crate::error::SendFailure;

/// Result of a send attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The store committed the message.
    Sent(MessageId),
    /// Nothing to send: the content was empty after trimming.
    Skipped,
}

/// Appends messages on behalf of one sender.
///
/// There is no optimistic local echo: the sender's thread shows the message
/// once the change feed delivers the committed insert.
#[derive(Clone)]
pub struct SendPipeline {
    backend: Arc<dyn ChatBackend>,
    sender: UserId,
}

impl SendPipeline {
    pub fn new(backend: Arc<dyn ChatBackend>, sender: UserId) -> Self {
        Self { backend, sender }
    }

    /// Append `content` (trimmed) to `chat_id`.
    ///
    /// Whitespace-only content is a no-op.  A rejected write is returned as
    /// [`SendFailure`] and is not retried.
    pub async fn send(&self, chat_id: ChatId, content: &str) -> Result<SendOutcome, SendFailure> {
        let content = content.trim();
        if content.is_empty() {
            debug!(chat = %chat_id, "nothing to send");
            return Ok(SendOutcome::Skipped);
        }

        match self.backend.insert_message(chat_id, self.sender, content).await {
            Ok(message) => {
                info!(chat = %chat_id, message = %message.id, "message sent");
                Ok(SendOutcome::Sent(message.id))
            }
            Err(source) => {
                warn!(chat = %chat_id, error = %source, "message send failed");
                Err(SendFailure { chat_id, source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::{FlakyBackend, Fixture};

    #[tokio::test]
    async fn blank_content_touches_nothing() {
        let fx = Fixture::new();
        let flaky = FlakyBackend::new(fx.backend.clone());
        let pipeline = SendPipeline::new(flaky.clone(), fx.me);

        assert_eq!(pipeline.send(fx.chat, "").await.unwrap(), SendOutcome::Skipped);
        assert_eq!(pipeline.send(fx.chat, "   ").await.unwrap(), SendOutcome::Skipped);
        assert_eq!(pipeline.send(fx.chat, "\n\t").await.unwrap(), SendOutcome::Skipped);

        assert_eq!(flaky.inserts.load(Ordering::SeqCst), 0);
        assert!(fx.backend.fetch_messages(fx.chat).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn content_is_trimmed_and_persisted() {
        let fx = Fixture::new();
        let pipeline = SendPipeline::new(fx.shared(), fx.me);

        let outcome = pipeline.send(fx.chat, "  hello  ").await.unwrap();
        let SendOutcome::Sent(id) = outcome else {
            panic!("expected a send, got {outcome:?}");
        };

        let stored = fx.backend.with_db(|db| db.get_message_by_id(id)).unwrap();
        assert_eq!(stored.content, "hello");
        assert_eq!(stored.sender_id, fx.me);
        assert!(!stored.read);
    }

    #[tokio::test]
    async fn store_failure_is_reported_without_retry() {
        let fx = Fixture::new();
        let flaky = FlakyBackend::new(fx.backend.clone());
        flaky.fail_insert.store(true, Ordering::SeqCst);
        let pipeline = SendPipeline::new(flaky.clone(), fx.me);

        let err = pipeline.send(fx.chat, "hello").await.unwrap_err();
        assert_eq!(err.chat_id, fx.chat);
        assert_eq!(flaky.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_member_send_fails() {
        let fx = Fixture::new();
        let stranger = fx.add_user("Stranger");
        let pipeline = SendPipeline::new(fx.shared(), stranger);

        let err = pipeline.send(fx.chat, "hey").await.unwrap_err();
        assert!(matches!(err.source, kindred_store::StoreError::NotParticipant { .. }));
    }
}
