//! Error types for herald-core

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the configuration store.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Atomic rename of the temp file failed
    #[error("failed to persist config to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Webhook URL rejected by validation
    #[error("invalid webhook URL: {0}")]
    InvalidWebhookUrl(String),

    /// The in-memory lock was poisoned by a panicking writer
    #[error("config lock poisoned")]
    Poisoned,
}

/// Errors from the sprite catalog.
///
/// `NotFound` is a lookup miss and is cached; every other variant is a
/// lookup failure and is not.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog entry not found: {key}")]
    NotFound { key: String },

    #[error("catalog returned status {status} for {key}")]
    Status { key: String, status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }
}

/// Webhook delivery errors.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("webhook returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Rate limited without a usable retry delay
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Payload could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Network(err.to_string())
    }
}

/// Failure delivering a message to one connected session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session {0} is disconnected")]
    Disconnected(String),

    #[error("session {name} rejected message: {reason}")]
    Rejected { name: String, reason: String },
}

/// Failure resolving the world or position context of an appearance.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("unrecognised world descriptor: {0}")]
    UnknownWorld(String),

    #[error("position is not finite: {0}")]
    InvalidPosition(String),
}

/// Errors assembling a [`crate::Herald`].
#[derive(Error, Debug)]
pub enum HeraldError {
    #[error("webhook transport: {0}")]
    Transport(#[from] DeliveryError),

    #[error("sprite catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}
