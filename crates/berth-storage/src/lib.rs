//! Object store accessor for Berth.
//!
//! This crate reads and writes git objects (blobs, trees, commits) and
//! branch refs directly against a bare repository directory. It is the
//! lowest layer of the repository engine: everything above it (branches,
//! commits, diffs, merges) is built from these primitives, and the smart
//! HTTP gateway relies on the on-disk layout written here being readable
//! by a stock `git http-backend`.

mod commit;
mod error;
mod object;
mod odb;
mod refs;
mod repo;
pub mod tree;

pub use commit::{Commit, Signature};
pub use error::StorageError;
pub use object::{GitObject, ObjectId, ObjectType};
pub use odb::Odb;
pub use refs::{RefDb, DEFAULT_BRANCH};
pub use repo::Repository;
pub use tree::{walk_pair, FileMode, FlatTree, TreeEntry};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
