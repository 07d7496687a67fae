//! # kindred-sync
//!
//! Chat synchronization core.
//!
//! - [`ConversationAggregator`] keeps the chat list (one [`ChatSummary`] per
//!   conversation, most recent first, with unread counts) in step with the
//!   change feed.
//! - [`ConversationThread`] keeps one open conversation's history, newest
//!   first, merging the initial fetch with live inserts.
//! - [`ReadTracker`] propagates read receipts.
//! - [`SendPipeline`] appends outgoing messages; senders see their own
//!   message when the feed echoes it back.
//!
//! Every component talks to the store through the [`ChatBackend`] trait and
//! takes the current user explicitly at construction.

pub mod aggregator;
pub mod backend;
pub mod config;
pub mod error;
pub mod feed;
pub mod read_tracking;
pub mod send;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{summarize, ChatListState, ChatSummary, ConversationAggregator};
pub use backend::{ChatBackend, SqliteBackend};
pub use config::SyncConfig;
pub use error::{Result, SendFailure, SyncError};
pub use feed::{ChangeFeed, FeedFilter, FeedItem, Subscription};
pub use read_tracking::ReadTracker;
pub use send::{SendOutcome, SendPipeline};
pub use thread::{ConversationThread, ThreadState};
