//! Completion API access.

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiClient;

/// Turns prior context plus a new message into reply text.
///
/// Implementations never fail: every error becomes a user-visible string so
/// the sender always gets an answer.
pub trait Completion: Send + Sync + 'static {
    fn complete(
        &self,
        context: &str,
        new_text: &str,
    ) -> impl std::future::Future<Output = String> + Send;
}
