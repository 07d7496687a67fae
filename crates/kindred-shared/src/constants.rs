/// Application name
pub const APP_NAME: &str = "Kindred";

/// Maximum number of characters the compose box accepts for one message.
/// Enforced by the input surface, not by the send pipeline.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Default capacity of the in-process change feed broadcast buffer.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Default page size when paging through a chat's history.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// User-facing error shown by the chat list when loading fails.
pub const CHATS_LOAD_ERROR: &str = "Failed to load chats";

/// User-facing error shown by the thread view when loading fails.
pub const MESSAGES_LOAD_ERROR: &str = "Failed to load messages";
