//! Error types for the bridge.
//!
//! Only genuinely exceptional conditions live here. Quota refusals and
//! unknown operations are reported to the contributor as plain status
//! strings, never as errors (they carry no stack of failure, just an
//! answer).

use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bridge.
#[derive(Error, Debug)]
pub enum Error {
    /// Webhook body could not be parsed as a notification payload.
    /// Logged and dropped; the sender only ever gets an acknowledgment.
    #[error("Malformed notification payload: {0}")]
    MalformedPayload(String),

    /// Missing or rejected credential. A client can only be built from a
    /// credential with a non-empty token blob.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure talking to the mirror service.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The mirror service answered with a non-success status.
    #[error("Mirror service returned {status}: {body}")]
    Api { status: u16, body: String },
}
