//! Gateway error types.

use thiserror::Error;

/// Errors that can occur when talking to the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure (connection refused, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    /// The call did not finish within the configured timeout.
    #[error("gateway timed out")]
    Timeout,

    /// Non-success HTTP status.
    #[error("OpenClaw Gateway error {status}: {message}")]
    Api { status: u16, message: String },

    /// The gateway answered 2xx but reported an error in the body.
    #[error("{0}")]
    Remote(String),

    /// The response did not have the expected shape.
    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Http(err)
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}
