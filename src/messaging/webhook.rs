//! Push intake: the platform POSTs updates to `/bot/update`.
//!
//! The endpoint always answers 200, whatever the body or the pipeline
//! outcome, so the platform never retries an update.

use crate::llm::Completion;
use crate::messaging::Messaging;
use crate::messaging::telegram::{Update, inbound_from_update};
use crate::relay::Relay;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Path the platform delivers updates to.
pub const UPDATE_PATH: &str = "/bot/update";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Public webhook URL for a deployment base URL.
pub fn webhook_url(public_url: &str) -> String {
    format!("{}{UPDATE_PATH}", public_url.trim_end_matches('/'))
}

/// Routes for the webhook transport.
pub fn router<C: Completion, M: Messaging>(relay: Arc<Relay<C, M>>) -> Router {
    Router::new()
        .route(UPDATE_PATH, post(receive_update::<C, M>))
        .route("/health", get(health))
        .with_state(relay)
}

/// Bind and serve until `shutdown` fires.
pub async fn start_webhook_server<C: Completion, M: Messaging>(
    bind: SocketAddr,
    relay: Arc<Relay<C, M>>,
    shutdown: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "webhook server listening");

    let app = router(relay);
    let handle = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        {
            tracing::error!(%error, "webhook server exited with error");
        }
    });

    Ok(handle)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn receive_update<C: Completion, M: Messaging>(
    State(relay): State<Arc<Relay<C, M>>>,
    body: Bytes,
) -> StatusCode {
    // Parse by hand: a rejected body must still be acknowledged.
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(error) => {
            tracing::warn!(%error, "ignoring undecodable update");
            return StatusCode::OK;
        }
    };

    let Some(inbound) = inbound_from_update(&update) else {
        tracing::debug!(update_id = update.update_id, "update carries no message");
        return StatusCode::OK;
    };

    // If the platform hangs up, this handler future is dropped and the guard
    // cancels the token. The spawned pipeline keeps its store and completion
    // work but will not send.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let task = tokio::spawn(async move { relay.handle(inbound, &cancel).await });
    match task.await {
        Ok(outcome) => {
            tracing::debug!(update_id = update.update_id, ?outcome, "update processed");
        }
        Err(error) => {
            tracing::error!(%error, update_id = update.update_id, "relay task failed");
        }
    }

    guard.disarm();
    StatusCode::OK
}
