//! CRUD operations for [`Chat`] records and chat membership.

use rusqlite::params;

use kindred_shared::types::{ChatId, UserId};

use crate::database::{decode_ts, decode_uuid, encode_ts, not_found, Database};
use crate::error::Result;
use crate::models::{Chat, ChatRecord, Participant};
use crate::profiles::row_to_participant;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new chat.
    pub fn create_chat(&self, chat: &Chat) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chats (id, created_at, updated_at) VALUES (?1, ?2, ?3)",
            params![
                chat.id.to_string(),
                encode_ts(&chat.created_at),
                encode_ts(&chat.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Add a member to a chat.  Adding an existing member is a no-op.
    pub fn add_participant(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
            params![chat_id.to_string(), user_id.to_string()],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by id.
    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT id, created_at, updated_at FROM chats WHERE id = ?1",
                params![id.to_string()],
                row_to_chat,
            )
            .map_err(not_found)
    }

    /// List the chats `user_id` belongs to, most recently active first.
    pub fn list_chats_for_user(&self, user_id: UserId) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.created_at, c.updated_at
             FROM chats c
             JOIN chat_participants p ON p.chat_id = c.id
             WHERE p.user_id = ?1
             ORDER BY c.updated_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Profiles of every member of a chat, ordered by name.
    pub fn participants_for_chat(&self, chat_id: ChatId) -> Result<Vec<Participant>> {
        let mut stmt = self.conn().prepare(
            "SELECT pr.id, pr.name, pr.avatar_url
             FROM chat_participants p
             JOIN profiles pr ON pr.id = p.user_id
             WHERE p.chat_id = ?1
             ORDER BY pr.name ASC",
        )?;

        let rows = stmt.query_map(params![chat_id.to_string()], row_to_participant)?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    /// Ids of every member of a chat.
    pub fn participant_ids(&self, chat_id: ChatId) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM chat_participants WHERE chat_id = ?1")?;

        let rows = stmt.query_map(params![chat_id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            Ok(UserId(decode_uuid(0, &id_str)?))
        })?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn is_participant(&self, chat_id: ChatId, user_id: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Every chat `user_id` belongs to, with membership and full history.
    pub fn fetch_chats_for_user(&self, user_id: UserId) -> Result<Vec<ChatRecord>> {
        let chats = self.list_chats_for_user(user_id)?;

        let mut records = Vec::with_capacity(chats.len());
        for chat in chats {
            let participants = self.participants_for_chat(chat.id)?;
            let messages = self.get_all_messages_for_chat(chat.id)?;
            records.push(ChatRecord {
                chat,
                participants,
                messages,
            });
        }

        tracing::debug!(user = %user_id, count = records.len(), "fetched chats for user");
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(1)?;
    let updated_str: String = row.get(2)?;

    Ok(Chat {
        id: ChatId(decode_uuid(0, &id_str)?),
        created_at: decode_ts(1, &created_str)?,
        updated_at: decode_ts(2, &updated_str)?,
    })
}
