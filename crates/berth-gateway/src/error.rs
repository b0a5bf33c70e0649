//! Gateway error types.

use thiserror::Error;

/// Errors that can occur while gatewaying a smart HTTP request.
///
/// Validation variants carry the offending input for internal logs; the
/// HTTP mapping never echoes subprocess or filesystem detail to clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The repository identifier failed the allow-list.
    #[error("invalid repository id: {0:?}")]
    InvalidRepository(String),

    /// The protocol sub-path or service is not one of the fixed set.
    #[error("invalid service: {0:?}")]
    InvalidService(String),

    /// The query string failed the allow-list.
    #[error("invalid query string: {0:?}")]
    InvalidQuery(String),

    /// The repository does not exist under the storage root.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// A live stream exceeded its byte ceiling.
    #[error("payload too large")]
    PayloadTooLarge,

    /// The request exceeded the time ceiling.
    #[error("request timed out")]
    Timeout,

    /// The backend subprocess failed; detail stays internal.
    #[error("backend failure: {0}")]
    Backend(String),

    /// I/O error talking to the subprocess.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
