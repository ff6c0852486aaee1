//! Top-level error types for Relaybot.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),
}

/// Message store failures. Recovered at the store boundary; they degrade
/// memory but never block a reply.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to connect to SQLite: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Completion API failures. Converted into a fixed user-visible reply.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion API returned {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("completion response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Outbound send failures. Reported to the caller, never retried here.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("platform request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("platform rejected {method}: {description}")]
    Rejected { method: String, description: String },

    #[error("send cancelled before delivery")]
    Cancelled,
}
