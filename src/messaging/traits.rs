//! Messaging trait for outbound delivery.

use crate::error::TransportError;

use tokio_util::sync::CancellationToken;

/// Static trait for messaging adapters.
pub trait Messaging: Send + Sync + 'static {
    /// Unique name for this adapter.
    fn name(&self) -> &str;

    /// Deliver `text` to `chat_id`.
    ///
    /// Must not start a delivery once `cancel` has fired. Failures are
    /// returned, not retried.
    fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Health check.
    fn health_check(&self) -> impl std::future::Future<Output = Result<(), TransportError>> + Send {
        async { Ok(()) }
    }
}
