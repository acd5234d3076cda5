//! Unified SDK error types.
//!
//! Nothing in this taxonomy is meant to escape into the embedding page:
//! the high-level client absorbs every variant and degrades to `None`/no-op.

use crate::shared::ContainerId;
use thiserror::Error;

/// Top-level SDK error.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// HTTP-layer errors.
#[derive(Error, Debug)]
pub enum HttpError {
    #[cfg(feature = "http")]
    #[error("Request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Timeout")]
    Timeout,

    /// The client was torn down while a retry was pending. Silent by policy.
    #[error("Cancelled by client teardown")]
    Cancelled,

    /// All attempts failed. Callers degrade gracefully instead of surfacing this.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl HttpError {
    /// Whether this failure class may succeed on a later attempt.
    ///
    /// 4xx validation failures are final; transport faults and retryable
    /// server statuses are not.
    pub fn is_retryable(&self, retryable_statuses: &[u16]) -> bool {
        match self {
            HttpError::ServerError { status, .. } => retryable_statuses.contains(status),
            HttpError::RateLimited { .. } => true,
            HttpError::Timeout => true,
            #[cfg(feature = "http")]
            HttpError::Reqwest(re) => re.is_connect() || re.is_timeout() || re.is_request(),
            _ => false,
        }
    }
}

/// Slot registry errors.
#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("Slot already occupied: {0}")]
    SlotOccupied(ContainerId),

    #[error("Unknown slot: {0}")]
    UnknownSlot(ContainerId),

    #[error("Invalid render state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
