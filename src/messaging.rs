//! Messaging adapters: Telegram delivery plus webhook and polling intake.

pub mod polling;
pub mod telegram;
pub mod traits;
pub mod webhook;

pub use telegram::TelegramAdapter;
pub use traits::Messaging;
