use thiserror::Error;

use kindred_shared::types::ChatId;
use kindred_store::StoreError;

/// Errors surfaced by the synchronization views.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The view's background task has already shut down.
    #[error("View closed")]
    Closed,
}

/// A message passed validation but the store rejected the write.
///
/// The pipeline never retries; the caller keeps the draft and decides.
#[derive(Error, Debug)]
#[error("Failed to send message to chat {chat_id}: {source}")]
pub struct SendFailure {
    pub chat_id: ChatId,
    #[source]
    pub source: StoreError,
}

pub type Result<T> = std::result::Result<T, SyncError>;
