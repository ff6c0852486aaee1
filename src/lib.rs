//! Relaybot: a chat relay that gives a stateless completion API a memory.
//!
//! Each inbound text message is answered using the sender's recent history
//! from SQLite as context, then appended to that history.

pub mod config;
pub mod conversation;
pub mod daemon;
pub mod error;
pub mod llm;
pub mod messaging;
pub mod relay;

pub use error::{Error, Result};

/// Inbound text event, stripped of any platform envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Where the reply goes.
    pub chat_id: i64,
    /// Platform-assigned numeric id of the sender.
    pub sender_id: i64,
    /// Username, else first name. `None` when the platform has neither.
    pub sender_display_name: Option<String>,
    /// `None` for non-text messages (stickers, photos, ...).
    pub text: Option<String>,
}

impl InboundMessage {
    /// Stable key used to store and look up this sender's history.
    pub fn sender_key(&self) -> String {
        match self.sender_display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.sender_id.to_string(),
        }
    }
}
