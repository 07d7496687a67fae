//! Identifiers, the message record, and the change-feed wire format shared by
//! every Kindred crate.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{ChangeEvent, ChangeKind};
pub use types::{ChatId, Message, MessageId, UserId};
