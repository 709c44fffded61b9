use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the session, request, and timesheet layers.
///
/// Transient auth failures (an unauthorized session-check) are recovered
/// internally with a single re-login; everything here is what remains after
/// that. Mutations are never retried automatically since the platform gives
/// no idempotency guarantees.
#[derive(Debug, Error)]
pub enum BambooError {
    /// The credential provider had nothing for this host. Fatal, raised
    /// before any network call.
    #[error("no credential found for host {0}")]
    MissingCredential(String),

    /// The session was rejected and the single re-login attempt failed too.
    #[error("session is unauthorized and re-login did not recover it")]
    Unauthorized,

    /// An expected marker was missing from a scraped page, or the value
    /// following it was not well formed. Usually means the page layout
    /// changed upstream.
    #[error("marker {marker:?} not found or not followed by a complete value")]
    Scrape { marker: String },

    /// Transport-level failure from the underlying client.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A request completed with a non-success status.
    #[error("request to {endpoint} failed with status {status}")]
    Request { endpoint: String, status: StatusCode },

    /// A JSON endpoint returned a body we could not decode.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// A header could not be constructed (bad endpoint, token, or name text).
    #[error("invalid header: {0}")]
    Header(String),
}
