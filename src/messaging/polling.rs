//! Pull intake: long-poll `getUpdates` and relay each message.

use crate::llm::Completion;
use crate::messaging::Messaging;
use crate::messaging::telegram::{TelegramAdapter, inbound_from_update};
use crate::relay::Relay;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Poll until `shutdown` fires, then wait for in-flight messages to finish.
///
/// Every message runs as its own task; there is no bound on how many run at
/// once.
pub async fn run_polling<C: Completion, M: Messaging>(
    source: &TelegramAdapter,
    relay: Arc<Relay<C, M>>,
    timeout_secs: u64,
    shutdown: CancellationToken,
) {
    let tracker = TaskTracker::new();
    let mut offset: Option<i64> = None;

    tracing::info!(timeout_secs, "polling for updates");

    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = source.get_updates(offset, timeout_secs) => result,
        };

        let updates = match result {
            Ok(updates) => updates,
            Err(error) => {
                tracing::warn!(%error, "failed to poll for updates");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                }
                continue;
            }
        };

        for update in updates {
            // Acknowledge every update, even ones we skip.
            offset = Some(offset.map_or(update.update_id + 1, |o| o.max(update.update_id + 1)));

            let Some(inbound) = inbound_from_update(&update) else {
                continue;
            };
            let relay = relay.clone();
            // No outer caller can hang up on a polled message.
            let cancel = CancellationToken::new();
            tracker.spawn(async move {
                let outcome = relay.handle(inbound, &cancel).await;
                tracing::debug!(update_id = update.update_id, ?outcome, "update processed");
            });
        }
    }

    tracker.close();
    tracing::info!(in_flight = tracker.len(), "polling stopped, draining in-flight messages");
    tracker.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelegramConfig;
    use crate::conversation::history::tests::memory_store;
    use crate::relay::tests::{RecordingMessenger, ScriptedCompletion};

    use axum::Json;
    use axum::Router;
    use axum::extract::{Path, State};
    use parking_lot::Mutex;

    /// Serves one batch of updates, then empty batches.
    #[derive(Clone, Default)]
    struct FakeUpdates {
        batches: Arc<Mutex<Vec<serde_json::Value>>>,
        offsets: Arc<Mutex<Vec<Option<i64>>>>,
    }

    async fn get_updates(
        State(fake): State<FakeUpdates>,
        Path((_token, _method)): Path<(String, String)>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        fake.offsets.lock().push(body["offset"].as_i64());
        let batch = fake.batches.lock().pop().unwrap_or_else(|| serde_json::json!([]));
        if batch.as_array().is_some_and(|updates| updates.is_empty()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Json(serde_json::json!({ "ok": true, "result": batch }))
    }

    #[tokio::test]
    async fn relays_polled_messages_and_advances_offset() {
        let fake = FakeUpdates::default();
        fake.batches.lock().push(serde_json::json!([
            {
                "update_id": 500,
                "message": { "message_id": 1, "chat": { "id": 42 }, "from": { "id": 7, "username": "alice" }, "text": "hello" }
            },
            { "update_id": 501 },
            {
                "update_id": 502,
                "message": { "message_id": 2, "chat": { "id": 43 }, "from": { "id": 8, "username": "bob" }, "text": "hi" }
            }
        ]));

        let app = Router::new()
            .route("/{token}/{method}", axum::routing::post(get_updates))
            .with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let source = TelegramAdapter::new(&TelegramConfig {
            token: "123:ABC".into(),
            api_url: format!("http://{addr}"),
            poll_timeout_secs: 0,
        })
        .unwrap();

        let messenger = Arc::new(RecordingMessenger::default());
        let relay = Arc::new(Relay::new(
            memory_store().await,
            ScriptedCompletion::replying("pong"),
            messenger.clone(),
            50,
        ));

        let shutdown = CancellationToken::new();
        let poller = {
            let relay = relay.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { run_polling(&source, relay, 0, shutdown).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while messenger.sent.lock().len() < 2 || fake.offsets.lock().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("both messages should be relayed");

        shutdown.cancel();
        poller.await.unwrap();

        let mut sent = messenger.sent.lock().clone();
        sent.sort();
        assert_eq!(sent, vec![(42, "pong".to_string()), (43, "pong".to_string())]);

        let offsets = fake.offsets.lock().clone();
        assert_eq!(offsets[0], None);
        assert_eq!(offsets[1], Some(503));
        assert_eq!(relay.store().count_for("alice").await.unwrap(), 1);
    }
}
