//! Conversation history and context management.

pub mod context;
pub mod history;

pub use context::format_context;
pub use history::{MessageStore, StoredMessage};
