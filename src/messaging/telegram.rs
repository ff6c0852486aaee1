//! Telegram Bot API adapter over plain HTTPS.

use crate::InboundMessage;
use crate::config::TelegramConfig;
use crate::error::{Result, TransportError};
use crate::messaging::traits::Messaging;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Telegram rejects messages longer than this.
const MAX_MESSAGE_LENGTH: usize = 4096;

/// Headroom on top of the long-poll timeout before the HTTP client gives up.
const POLL_GRACE_SECS: u64 = 10;

/// Telegram adapter state.
pub struct TelegramAdapter {
    http_client: reqwest::Client,
    /// `<api_url>/bot<token>`; contains the token, never log it.
    bot_url: String,
}

/// `{ok, result, description}` envelope wrapped around every Bot API reply.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// One entry from `getUpdates` or a webhook POST.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl TelegramAdapter {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + POLL_GRACE_SECS))
            .build()
            .map_err(TransportError::Request)?;

        Ok(Self {
            http_client,
            bot_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), config.token),
        })
    }

    /// Invoke a Bot API method and unwrap its envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<T, TransportError> {
        // Transport errors carry the URL, which carries the token.
        let response: ApiResponse<T> = self
            .http_client
            .post(format!("{}/{method}", self.bot_url))
            .json(body)
            .send()
            .await
            .map_err(|error| TransportError::Request(error.without_url()))?
            .json()
            .await
            .map_err(|error| TransportError::Request(error.without_url()))?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(TransportError::Rejected {
                method: method.to_string(),
                description: description.unwrap_or_else(|| "no description".into()),
            }),
        }
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> std::result::Result<Vec<Update>, TransportError> {
        let mut body = serde_json::json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = serde_json::json!(offset);
        }
        self.call("getUpdates", &body).await
    }

    /// Point the platform at our webhook endpoint.
    pub async fn set_webhook(&self, url: &str) -> std::result::Result<(), TransportError> {
        let _: bool = self
            .call("setWebhook", &serde_json::json!({ "url": url }))
            .await?;
        Ok(())
    }

    /// Remove any registered webhook so `getUpdates` is allowed.
    pub async fn delete_webhook(&self) -> std::result::Result<(), TransportError> {
        let _: bool = self.call("deleteWebhook", &serde_json::json!({})).await?;
        Ok(())
    }
}

impl Messaging for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), TransportError> {
        for chunk in split_message(text, MAX_MESSAGE_LENGTH) {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let body = serde_json::json!({ "chat_id": chat_id, "text": chunk });
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                result = self.call::<serde_json::Value>("sendMessage", &body) => {
                    result?;
                }
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> std::result::Result<(), TransportError> {
        let me: serde_json::Value = self.call("getMe", &serde_json::json!({})).await?;
        tracing::debug!(username = ?me["username"].as_str(), "telegram bot reachable");
        Ok(())
    }
}

/// Map an update to the inbound event. `None` when it carries no message.
///
/// The sender is the message author, or the chat itself when Telegram omits
/// the author (channel posts).
pub fn inbound_from_update(update: &Update) -> Option<InboundMessage> {
    let message = update.message.as_ref()?;

    let (sender_id, sender_display_name) = match &message.from {
        Some(user) => (user.id, user.username.clone().or(user.first_name.clone())),
        None => (
            message.chat.id,
            message.chat.username.clone().or(message.chat.first_name.clone()),
        ),
    };

    Some(InboundMessage {
        chat_id: message.chat.id,
        sender_id,
        sender_display_name,
        text: message.text.clone(),
    })
}

/// Break `text` into chunks of at most `max_chars` characters.
///
/// Telegram counts the limit in characters, not bytes. Cuts prefer the last
/// newline, then the last space, inside the window; whitespace at the start of
/// the next chunk is dropped.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        // Byte offset of the first character past the window, if any.
        let Some((window_end, _)) = remaining.char_indices().nth(max_chars) else {
            if !remaining.is_empty() || chunks.is_empty() {
                chunks.push(remaining.to_string());
            }
            return chunks;
        };

        let window = &remaining[..window_end];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&index| index > 0)
            .unwrap_or(window_end);

        chunks.push(remaining[..cut].to_string());
        remaining = remaining[cut..].trim_start();
    }
}
