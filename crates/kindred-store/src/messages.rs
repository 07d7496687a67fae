//! Message persistence: append, history scans, and read receipts.

use chrono::{Duration, SubsecRound, Utc};
use rusqlite::params;

use kindred_shared::types::{ChatId, Message, MessageId, UserId};

use crate::database::{decode_ts, decode_uuid, encode_ts, not_found, Database};
use crate::error::{Result, StoreError};

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, content, created_at, read";

impl Database {
    /// Append a message to a chat and bump the chat's `updated_at`.
    ///
    /// `created_at` is assigned here and is strictly greater than every
    /// earlier commit to the same chat, so `created_at DESC` is a total order
    /// over a chat's history.
    pub fn insert_message(&self, chat_id: ChatId, sender_id: UserId, content: &str) -> Result<Message> {
        if !self.is_participant(chat_id, sender_id)? {
            return Err(StoreError::NotParticipant {
                chat_id: chat_id.to_string(),
                user_id: sender_id.to_string(),
            });
        }

        let tx = self.conn().unchecked_transaction()?;

        let chat = self.get_chat(chat_id)?;
        let mut created_at = Utc::now().trunc_subsecs(6);
        if created_at <= chat.updated_at {
            created_at = chat.updated_at + Duration::microseconds(1);
        }

        let message = Message {
            id: MessageId::new(),
            chat_id,
            sender_id,
            content: content.to_string(),
            created_at,
            read: false,
        };

        tx.execute(
            "INSERT INTO messages (id, chat_id, sender_id, content, created_at, read)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![
                message.id.to_string(),
                chat_id.to_string(),
                sender_id.to_string(),
                message.content,
                encode_ts(&created_at),
            ],
        )?;
        tx.execute(
            "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
            params![encode_ts(&created_at), chat_id.to_string()],
        )?;
        tx.commit()?;

        Ok(message)
    }

    /// One page of a chat's history, newest first.
    pub fn get_messages_for_chat(&self, chat_id: ChatId, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE chat_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![chat_id.to_string(), limit, offset], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// A chat's entire history, newest first.
    pub fn get_all_messages_for_chat(&self, chat_id: ChatId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE chat_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![chat_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message_by_id(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// Mark every unread message in `chat_id` not sent by `reader` as read.
    ///
    /// Returns the messages that actually flipped, already carrying
    /// `read = true`.  A second call with nothing left to mark returns an
    /// empty list.
    pub fn mark_messages_as_read(&self, chat_id: ChatId, reader: UserId) -> Result<Vec<Message>> {
        let tx = self.conn().unchecked_transaction()?;

        let mut flipped = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages
                 WHERE chat_id = ?1 AND sender_id != ?2 AND read = 0
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(
                params![chat_id.to_string(), reader.to_string()],
                row_to_message,
            )?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            messages
        };

        tx.execute(
            "UPDATE messages SET read = 1
             WHERE chat_id = ?1 AND sender_id != ?2 AND read = 0",
            params![chat_id.to_string(), reader.to_string()],
        )?;
        tx.commit()?;

        for message in &mut flipped {
            message.read = true;
        }
        Ok(flipped)
    }

    /// Number of messages in `chat_id` that `viewer` has not read yet.
    pub fn unread_count(&self, chat_id: ChatId, viewer: UserId) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?1 AND sender_id != ?2 AND read = 0",
            params![chat_id.to_string(), viewer.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let chat_id_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let content: String = row.get(3)?;
    let ts_str: String = row.get(4)?;
    let read: bool = row.get(5)?;

    Ok(Message {
        id: MessageId(decode_uuid(0, &id_str)?),
        chat_id: ChatId(decode_uuid(1, &chat_id_str)?),
        sender_id: UserId(decode_uuid(2, &sender_str)?),
        content,
        created_at: decode_ts(4, &ts_str)?,
        read,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::{chat_between, open_temp, profile};

    #[test]
    fn insert_orders_newest_first() {
        let (db, _dir) = open_temp();
        let ada = profile(&db, "Ada");
        let bo = profile(&db, "Bo");
        let chat = chat_between(&db, &[ada, bo]);

        let sent: Vec<Message> = (0..5)
            .map(|i| db.insert_message(chat.id, if i % 2 == 0 { ada } else { bo }, &format!("m{i}")).unwrap())
            .collect();

        let history = db.get_all_messages_for_chat(chat.id).unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m3", "m2", "m1", "m0"]);
        assert!(sent.windows(2).all(|w| w[0].created_at < w[1].created_at));

        let page = db.get_messages_for_chat(chat.id, 2, 1).unwrap();
        let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m2"]);

        assert_eq!(db.get_chat(chat.id).unwrap().updated_at, sent[4].created_at);
    }

    #[test]
    fn insert_requires_membership() {
        let (db, _dir) = open_temp();
        let ada = profile(&db, "Ada");
        let bo = profile(&db, "Bo");
        let chat = chat_between(&db, &[ada]);

        assert!(matches!(
            db.insert_message(chat.id, bo, "let me in"),
            Err(StoreError::NotParticipant { .. })
        ));
    }

    #[test]
    fn mark_read_is_idempotent_and_skips_own_messages() {
        let (db, _dir) = open_temp();
        let ada = profile(&db, "Ada");
        let bo = profile(&db, "Bo");
        let chat = chat_between(&db, &[ada, bo]);

        db.insert_message(chat.id, bo, "hi").unwrap();
        db.insert_message(chat.id, bo, "you there?").unwrap();
        let own = db.insert_message(chat.id, ada, "yes").unwrap();
        assert_eq!(db.unread_count(chat.id, ada).unwrap(), 2);

        let flipped = db.mark_messages_as_read(chat.id, ada).unwrap();
        assert_eq!(flipped.len(), 2);
        assert!(flipped.iter().all(|m| m.read && m.sender_id == bo));
        assert_eq!(db.unread_count(chat.id, ada).unwrap(), 0);

        assert!(db.mark_messages_as_read(chat.id, ada).unwrap().is_empty());
        assert_eq!(db.unread_count(chat.id, ada).unwrap(), 0);

        // Ada's own message is untouched; Bo still has it unread.
        assert!(!db.get_message_by_id(own.id).unwrap().read);
        assert_eq!(db.unread_count(chat.id, bo).unwrap(), 1);
    }
}
