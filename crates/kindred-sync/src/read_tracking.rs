//! Read receipts.

use std::sync::Arc;

use tracing::{debug, warn};

use kindred_shared::types::{ChatId, UserId};

use crate::backend::ChatBackend;

/// Marks a chat's incoming messages as read on behalf of one user.
///
/// Marking is best-effort: a failure is logged and reported as zero rows
/// changed, never as an error, so it cannot block the thread view.
#[derive(Clone)]
pub struct ReadTracker {
    backend: Arc<dyn ChatBackend>,
    reader: UserId,
}

impl ReadTracker {
    pub fn new(backend: Arc<dyn ChatBackend>, reader: UserId) -> Self {
        Self { backend, reader }
    }

    pub fn reader(&self) -> UserId {
        self.reader
    }

    /// Mark every unread message in `chat_id` not sent by the reader as read.
    ///
    /// Idempotent: repeated or overlapping calls converge on the same state.
    /// Returns how many messages this call flipped.
    pub async fn mark_read(&self, chat_id: ChatId) -> usize {
        match self.backend.mark_read(chat_id, self.reader).await {
            Ok(count) => {
                debug!(chat = %chat_id, reader = %self.reader, count, "marked messages read");
                count
            }
            Err(e) => {
                warn!(chat = %chat_id, reader = %self.reader, error = %e, "failed to mark messages read");
                0
            }
        }
    }
}
