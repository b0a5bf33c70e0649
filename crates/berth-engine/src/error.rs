//! Engine error types.

use berth_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A branch required by the operation does not exist.
    #[error("branch does not exist: {0}")]
    BranchNotFound(String),

    /// A branch with this name already exists.
    #[error("branch already exists: {0}")]
    BranchExists(String),

    /// Rebase found no shared history between the branches.
    #[error("no common ancestor between branches")]
    NoCommonAncestor,

    /// A merge strategy failed mid-flight; the target ref was not moved.
    #[error("merge failed: {0}")]
    MergeFailed(String),

    /// A supplied path or name failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Repository initialization could not be completed.
    #[error("repository initialization failed: {0}")]
    InitFailed(String),

    /// Underlying storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
