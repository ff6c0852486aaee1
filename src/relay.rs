//! The per-message pipeline shared by every transport.
//!
//! fetch history → format → complete → persist → reply.
//!
//! The triggering message is persisted only after the completion returns, so
//! it never appears in its own context. There is no per-sender serialization:
//! two concurrent messages from one sender may or may not see each other.

use crate::InboundMessage;
use crate::conversation::{MessageStore, format_context};
use crate::error::TransportError;
use crate::llm::Completion;
use crate::llm::prompt::NO_RESPONSE_REPLY;
use crate::messaging::Messaging;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What happened to one inbound message.
#[derive(Debug)]
pub enum RelayOutcome {
    /// No text: nothing stored, nothing sent.
    Ignored,
    /// A reply was delivered.
    Replied,
    /// The caller went away before the reply could be sent.
    Cancelled,
    /// The reply was produced but delivery failed.
    SendFailed(TransportError),
}

/// Wires the store, the completion API and an outbound adapter together.
pub struct Relay<C, M> {
    store: MessageStore,
    completion: C,
    messenger: Arc<M>,
    context_limit: i64,
}

impl<C: Completion, M: Messaging> Relay<C, M> {
    pub fn new(store: MessageStore, completion: C, messenger: Arc<M>, context_limit: i64) -> Self {
        Self {
            store,
            completion,
            messenger,
            context_limit,
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Process one message. Never fails; every internal error degrades to a
    /// textual reply or a logged outcome.
    #[tracing::instrument(skip_all, fields(chat_id = inbound.chat_id, adapter = self.messenger.name()))]
    pub async fn handle(&self, inbound: InboundMessage, cancel: &CancellationToken) -> RelayOutcome {
        let Some(text) = inbound.text.as_deref().filter(|text| !text.is_empty()) else {
            tracing::debug!("ignoring message without text");
            return RelayOutcome::Ignored;
        };
        let sender = inbound.sender_key();

        let history = self
            .store
            .fetch_recent_or_empty(&sender, self.context_limit)
            .await;
        let context = format_context(&history);
        tracing::debug!(%sender, history_len = history.len(), "context assembled");

        let mut reply = self.completion.complete(&context, text).await;
        if reply.trim().is_empty() {
            reply = NO_RESPONSE_REPLY.to_string();
        }

        self.store.save_or_log(&sender, text).await;

        if cancel.is_cancelled() {
            tracing::info!(%sender, "caller gone, reply not sent");
            return RelayOutcome::Cancelled;
        }

        match self.messenger.send_text(inbound.chat_id, &reply, cancel).await {
            Ok(()) => {
                tracing::info!(%sender, reply_len = reply.len(), "reply sent");
                RelayOutcome::Replied
            }
            Err(TransportError::Cancelled) => {
                tracing::info!(%sender, "caller gone, reply not sent");
                RelayOutcome::Cancelled
            }
            Err(error) => {
                tracing::warn!(%error, %sender, "failed to send reply");
                RelayOutcome::SendFailed(error)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::conversation::history::tests::memory_store;

    use parking_lot::Mutex;

    /// Records every call and answers with a fixed reply.
    #[derive(Default)]
    pub(crate) struct ScriptedCompletion {
        pub reply: String,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedCompletion {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Completion for ScriptedCompletion {
        async fn complete(&self, context: &str, new_text: &str) -> String {
            self.calls
                .lock()
                .push((context.to_string(), new_text.to_string()));
            self.reply.clone()
        }
    }

    /// Records deliveries; optionally fails them.
    #[derive(Default)]
    pub(crate) struct RecordingMessenger {
        pub fail: bool,
        pub sent: Mutex<Vec<(i64, String)>>,
    }

    impl Messaging for RecordingMessenger {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send_text(
            &self,
            chat_id: i64,
            text: &str,
            cancel: &CancellationToken,
        ) -> Result<(), TransportError> {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            if self.fail {
                return Err(TransportError::Rejected {
                    method: "sendMessage".into(),
                    description: "Forbidden: bot was blocked by the user".into(),
                });
            }
            self.sent.lock().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    pub(crate) fn text_from(sender: &str, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: 42,
            sender_id: 7,
            sender_display_name: Some(sender.to_string()),
            text: Some(text.to_string()),
        }
    }

    async fn relay_with(
        reply: &str,
        messenger: RecordingMessenger,
    ) -> Relay<ScriptedCompletion, RecordingMessenger> {
        Relay::new(
            memory_store().await,
            ScriptedCompletion::replying(reply),
            Arc::new(messenger),
            50,
        )
    }

    #[tokio::test]
    async fn conversation_builds_on_prior_messages() {
        let relay = relay_with("sure", RecordingMessenger::default()).await;
        let cancel = CancellationToken::new();

        let first = relay.handle(text_from("alice", "hello"), &cancel).await;
        let second = relay.handle(text_from("alice", "how are you"), &cancel).await;
        assert!(matches!(first, RelayOutcome::Replied));
        assert!(matches!(second, RelayOutcome::Replied));

        let calls = relay.completion.calls.lock().clone();
        assert_eq!(calls.len(), 2);
        // The triggering message is never part of its own context.
        assert_eq!(calls[0], (String::new(), "hello".to_string()));
        assert!(calls[1].0.ends_with(" - hello"));
        assert!(!calls[1].0.contains("how are you"));
        assert_eq!(calls[1].1, "how are you");

        let stored = relay.store.fetch_recent("alice", 10).await.unwrap();
        let texts: Vec<_> = stored.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["hello", "how are you"]);

        let sent = relay.messenger.sent.lock().clone();
        assert_eq!(sent, vec![(42, "sure".to_string()), (42, "sure".to_string())]);
    }

    #[tokio::test]
    async fn context_is_bounded_by_limit() {
        let store = memory_store().await;
        for n in 0..5 {
            store.save("alice", &format!("m{n}")).await.unwrap();
        }
        let relay = Relay::new(
            store,
            ScriptedCompletion::replying("ok"),
            Arc::new(RecordingMessenger::default()),
            2,
        );

        relay
            .handle(text_from("alice", "next"), &CancellationToken::new())
            .await;

        let calls = relay.completion.calls.lock().clone();
        assert_eq!(calls[0].0.lines().count(), 2);
        assert!(calls[0].0.contains("- m3"));
        assert!(calls[0].0.contains("- m4"));
    }

    #[tokio::test]
    async fn empty_or_missing_text_has_no_side_effects() {
        let relay = relay_with("unused", RecordingMessenger::default()).await;
        let cancel = CancellationToken::new();

        let mut without_text = text_from("alice", "");
        assert!(matches!(
            relay.handle(without_text.clone(), &cancel).await,
            RelayOutcome::Ignored
        ));
        without_text.text = None;
        assert!(matches!(
            relay.handle(without_text, &cancel).await,
            RelayOutcome::Ignored
        ));

        assert!(relay.completion.calls.lock().is_empty());
        assert!(relay.messenger.sent.lock().is_empty());
        assert_eq!(relay.store.count_for("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_failure_still_replies() {
        let relay = relay_with("still here", RecordingMessenger::default()).await;
        relay.store.close().await;

        let outcome = relay
            .handle(text_from("alice", "hello"), &CancellationToken::new())
            .await;

        assert!(matches!(outcome, RelayOutcome::Replied));
        assert_eq!(relay.completion.calls.lock()[0].0, "");
        assert_eq!(relay.messenger.sent.lock()[0].1, "still here");
    }

    #[tokio::test]
    async fn send_failure_is_reported_not_raised() {
        let messenger = RecordingMessenger {
            fail: true,
            ..Default::default()
        };
        let relay = relay_with("hi", messenger).await;

        let outcome = relay
            .handle(text_from("alice", "hello"), &CancellationToken::new())
            .await;

        assert!(matches!(
            outcome,
            RelayOutcome::SendFailed(TransportError::Rejected { .. })
        ));
        // The message is still remembered.
        assert_eq!(relay.store.count_for("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancelled_caller_skips_send_but_keeps_history() {
        let relay = relay_with("hi", RecordingMessenger::default()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = relay.handle(text_from("alice", "hello"), &cancel).await;

        assert!(matches!(outcome, RelayOutcome::Cancelled));
        assert_eq!(relay.completion.calls.lock().len(), 1);
        assert!(relay.messenger.sent.lock().is_empty());
        assert_eq!(relay.store.count_for("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn blank_completion_becomes_fallback_reply() {
        let relay = relay_with("   ", RecordingMessenger::default()).await;

        relay
            .handle(text_from("alice", "hello"), &CancellationToken::new())
            .await;

        assert_eq!(relay.messenger.sent.lock()[0].1, NO_RESPONSE_REPLY);
    }
}
