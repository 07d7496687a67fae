//! Change-feed wire format.
//!
//! The backend pushes row-level notifications as loosely typed JSON. Rows are
//! validated here and turned into [`ChangeEvent`]s before anything else in the
//! workspace sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{ChatId, Message, MessageId, UserId};

/// Row-level operation reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
}

impl ChangeKind {
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        match s {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            other => Err(ProtocolError::UnknownEventType(other.to_string())),
        }
    }
}

/// A validated notification about one `messages` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: Message,
    /// Members of the record's chat at commit time. Used to route the event
    /// to user-scoped subscriptions.
    #[serde(default)]
    pub audience: Vec<UserId>,
}

/// Untyped payload as delivered by the realtime endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChange {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(rename = "new")]
    pub new: RawMessageRow,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessageRow {
    pub id: Option<String>,
    pub chat_id: Option<String>,
    pub sender_id: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<String>,
    pub read: Option<bool>,
}

impl RawChange {
    pub fn parse(data: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn into_event(self, audience: Vec<UserId>) -> Result<ChangeEvent, ProtocolError> {
        let kind = ChangeKind::parse(&self.event_type)?;
        let record = self.new.into_message()?;
        Ok(ChangeEvent {
            kind,
            record,
            audience,
        })
    }
}

impl RawMessageRow {
    pub fn into_message(self) -> Result<Message, ProtocolError> {
        let id = parse_uuid("id", self.id)?;
        let chat_id = parse_uuid("chat_id", self.chat_id)?;
        let sender_id = parse_uuid("sender_id", self.sender_id)?;
        let content = self.content.ok_or(ProtocolError::MissingField("content"))?;
        let created_at = self
            .created_at
            .ok_or(ProtocolError::MissingField("created_at"))?;
        let created_at: DateTime<Utc> =
            DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc);

        Ok(Message {
            id: MessageId(id),
            chat_id: ChatId(chat_id),
            sender_id: UserId(sender_id),
            content,
            created_at,
            read: self.read.unwrap_or(false),
        })
    }
}

fn parse_uuid(field: &'static str, value: Option<String>) -> Result<uuid::Uuid, ProtocolError> {
    let value = value.ok_or(ProtocolError::MissingField(field))?;
    uuid::Uuid::parse_str(&value).map_err(|source| ProtocolError::InvalidUuid { field, source })
}
