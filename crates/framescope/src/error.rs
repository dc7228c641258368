//! Error taxonomy shared by the gateway, session, and envelope layers.

use thiserror::Error;

/// Errors surfaced to callers of the gateway and the exploration handlers.
///
/// Throttling is normally recovered inside the gateway and never reaches
/// the caller; [`GatewayError::Throttled`] only appears when a retry cap has
/// been configured and exhausted.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A requested page, frame, node, or item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or malformed input, rejected before any outbound call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Invalid limiter or gateway configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The API answered with a non-success status other than throttling.
    #[error("design API HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The request never produced a response (DNS, TLS, connection reset).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Throttled on every attempt allowed by the retry cap.
    #[error("still throttled after {attempts} attempt(s)")]
    Throttled { attempts: u32 },

    /// The cancellation token fired during an admission wait or backoff.
    #[error("operation cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        Self::Validation(what.into())
    }
}
