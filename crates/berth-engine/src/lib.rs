//! Repository engine for Berth.
//!
//! Higher-level version-control workflows built directly on the object
//! store: branch management, snapshot commits, two-tree diffs, the three
//! branch-integration strategies, and bare-repository lifecycle. All
//! operations here bypass the native git subprocess entirely; only the
//! smart HTTP gateway talks to one.

mod branch;
mod commit;
mod diff;
mod error;
mod lifecycle;
mod merge;

pub use branch::{create_branch, current_branch, delete_branch, list_branches, BranchInfo};
pub use commit::{create_commit, FileChange};
pub use diff::{diff, diff_commits, ChangeKind, Diff, DiffSummary, FileDiff};
pub use error::EngineError;
pub use lifecycle::{create_initial_commit, init_repository, normalize_layout};
pub use merge::{merge_base, merge_commit, rebase_merge, squash_merge};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
