//! Error types for potpie-chat

use thiserror::Error;

/// Result type alias using potpie-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the conversation service
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Service answered with a non-2xx status
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Reading the streamed response body failed
    #[error("Stream error: {0}")]
    Stream(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Streaming exhausted its retries and the polling fallback timed out
    #[error("Stream failed and fallback polling unsuccessful")]
    StreamFailed,
}

impl Error {
    /// Create a status error from a code and response body
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Check if this is an HTTP 404
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Status { status, .. } => *status == 404,
            Error::Http(e) => e.status().is_some_and(|s| s.as_u16() == 404),
            _ => false,
        }
    }

    /// Check if this error looks like a transient transport failure.
    ///
    /// The retry loop retries every failure regardless; this only feeds log fields.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::Stream(_) => true,
            Error::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
