//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred. Write failures are fatal to the operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An object's serialization could not be parsed.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    /// The requested object does not exist in the database.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// A ref was required to exist but does not.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// A branch ref already exists and the write was not forced.
    #[error("branch already exists: {0}")]
    BranchExists(String),

    /// A ref name or ref file content is malformed.
    #[error("invalid ref: {0}")]
    InvalidRef(String),

    /// Zlib compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// The repository directory does not exist or is not a repository.
    #[error("repository not found: {0}")]
    RepoNotFound(String),
}
