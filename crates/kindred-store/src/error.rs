use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The user tried to write to a chat they are not a member of.
    #[error("User {user_id} is not a participant of chat {chat_id}")]
    NotParticipant { chat_id: String, user_id: String },

    /// The shared connection mutex was poisoned by a panicking holder.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// The backend could not be reached (transport, auth, or server-side
    /// rejection when the store is remote).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
