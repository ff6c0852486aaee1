//! Process-level plumbing: tracing setup and shutdown signalling.

use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use std::path::Path;

/// Longest `message` field written before truncation.
const MAX_MESSAGE_CHARS: usize = 280;

fn truncate_for_log(message: &str, max_chars: usize) -> (&str, bool) {
    match message.char_indices().nth(max_chars) {
        Some((byte_index, _character)) => (&message[..byte_index], true),
        None => (message, false),
    }
}

fn field_formatter() -> impl for<'writer> tracing_subscriber::fmt::FormatFields<'writer> + 'static {
    format::debug_fn(|writer, field, value| {
        let field_name = field.name();

        if field_name == "message" {
            let formatted = format!("{value:?}");
            let (truncated, was_truncated) = truncate_for_log(&formatted, MAX_MESSAGE_CHARS);
            if was_truncated {
                write!(writer, "{}={}...", field_name, truncated)
            } else {
                write!(writer, "{}={formatted}", field_name)
            }
        } else {
            write!(writer, "{}={value:?}", field_name)
        }
    })
}

fn build_env_filter(debug: bool) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::new("info")
        }
    })
}

/// Initialize tracing to a daily rolling file under `log_dir`.
///
/// The returned guard flushes buffered lines on drop; hold it for the
/// process lifetime.
pub fn init_file_tracing(log_dir: &Path, debug: bool) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "relaybot.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .fmt_fields(field_formatter())
        .compact();

    tracing_subscriber::registry()
        .with(build_env_filter(debug))
        .with(fmt_layer)
        .init();

    guard
}

/// Initialize tracing for foreground (terminal) mode.
pub fn init_foreground_tracing(debug: bool) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .fmt_fields(field_formatter())
        .compact();

    tracing_subscriber::registry()
        .with(build_env_filter(debug))
        .with(fmt_layer)
        .init();
}

/// Cancel `shutdown` on Ctrl-C.
pub fn cancel_on_ctrl_c(shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    tracing::error!(%error, "failed to listen for shutdown signal");
                    return;
                }
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    })
}
