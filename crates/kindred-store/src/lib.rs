//! # kindred-store
//!
//! Reference implementation of the durable message store backing Kindred
//! chats, built on SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for profiles, chats,
//! chat membership and messages. Rows are converted into strongly typed
//! records at this boundary; anything that does not parse is reported as a
//! [`StoreError`] rather than handed upwards.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod profiles;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
