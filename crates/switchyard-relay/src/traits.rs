//! Streamer abstraction for the relay.
//!
//! Every stream follows the same pattern: set up the request, obtain a live
//! source of payloads, push each payload to the client, write a keepalive
//! when nothing arrives, and clean up when the connection ends.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The streamer could not be set up.
    #[error("Setup failed: {0}")]
    Setup(String),

    /// A payload could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Writing to the client failed.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// The default keepalive payload, `{"keepAlive":true}`.
#[must_use]
pub fn default_keepalive() -> serde_json::Value {
    serde_json::json!({ "keepAlive": true })
}

/// A source of payloads relayed to a single client.
#[async_trait]
pub trait Streamer: Send {
    /// Payload type written to the client.
    type Item: Serialize + Send;

    /// Prepare the stream. Called once before the first `recv`.
    async fn setup(&mut self) -> Result<(), RelayError>;

    /// Next payload, or `None` once the source is exhausted.
    async fn recv(&mut self) -> Option<Self::Item>;

    /// Payload written after an idle interval. `None` disables keepalives.
    fn keepalive(&self) -> Option<serde_json::Value> {
        Some(default_keepalive())
    }

    /// Release resources held by the stream. Must be idempotent.
    fn cleanup(&mut self);
}
