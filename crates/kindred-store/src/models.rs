//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a UI layer.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use kindred_shared::types::{ChatId, UserId};

pub use kindred_shared::types::{Message, MessageId};

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// Read-only projection of a user profile, as shown in chat headers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: UserId,
    pub name: String,
    pub avatar_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation between a fixed set of participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub created_at: DateTime<Utc>,
    /// Bumped every time a message is committed to the chat.
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new() -> Self {
        // Stored with microsecond precision.
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: ChatId::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ChatRecord
// ---------------------------------------------------------------------------

/// A chat together with its full membership and history, as returned when
/// listing the chats of one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRecord {
    pub chat: Chat,
    /// Every member, the requesting user included.
    pub participants: Vec<Participant>,
    /// Newest first.
    pub messages: Vec<Message>,
}
