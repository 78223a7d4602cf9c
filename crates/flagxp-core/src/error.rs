//! Error taxonomy for flagxp.

use std::time::Duration;

/// Errors raised while reading a review from the review system.
///
/// Every variant is fatal for the run: nothing is published once a fetch fails.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("review D{0} not found")]
    ReviewNotFound(u64),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("conduit call {method} exited with status {status}: {stderr}")]
    CommandFailed {
        method: String,
        status: i32,
        stderr: String,
    },

    #[error("conduit call {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("conduit call {method} returned error {code}: {message}")]
    Conduit {
        method: String,
        code: String,
        message: String,
    },

    #[error("conduit call {method} returned no response body")]
    EmptyResponse { method: String },

    #[error("malformed conduit response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while talking to the experiment service.
///
/// Only transport-level failures land here. An HTTP response of any status is
/// a [`PublishOutcome`](crate::publish::PublishOutcome), not an error.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("transport failure calling {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid experiment service url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Result type for review fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;
