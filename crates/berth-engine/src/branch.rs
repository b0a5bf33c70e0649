//! Branch management over the ref database.

use crate::{EngineError, Result};
use berth_storage::{ObjectId, RefDb, Repository, StorageError};
use serde::Serialize;
use tracing::warn;

/// A branch with its head commit metadata.
#[derive(Debug, Clone, Serialize)]
pub struct BranchInfo {
    /// Branch name.
    pub name: String,
    /// Head commit id.
    pub head: ObjectId,
    /// Head commit message; empty when the lookup failed.
    pub message: String,
    /// Head commit author; empty when the lookup failed.
    pub author: String,
    /// Head commit timestamp (unix seconds); zero when the lookup failed.
    pub date: i64,
}

/// Creates a branch at `start_point`, or at the default head when no
/// start point is given.
///
/// The start point resolves as a branch name, then as a raw ref read,
/// then as a literal commit hash, in that order.
pub fn create_branch(repo: &Repository, name: &str, start_point: Option<&str>) -> Result<ObjectId> {
    RefDb::validate_name(name).map_err(|_| EngineError::InvalidInput(name.to_string()))?;

    let target = match start_point {
        Some(start) => repo
            .refs()
            .read(start)?
            .ok_or_else(|| EngineError::BranchNotFound(start.to_string()))?,
        None => {
            let default = repo.refs().current_branch();
            repo.refs()
                .read(&default)?
                .ok_or(EngineError::BranchNotFound(default))?
        }
    };

    match repo.refs().write(name, target, false) {
        Ok(()) => Ok(target),
        Err(StorageError::BranchExists(name)) => Err(EngineError::BranchExists(name)),
        Err(e) => Err(e.into()),
    }
}

/// Deletes a branch. Fails if the branch does not exist.
pub fn delete_branch(repo: &Repository, name: &str) -> Result<()> {
    match repo.refs().delete(name) {
        Ok(()) => Ok(()),
        Err(StorageError::RefNotFound(name)) => Err(EngineError::BranchNotFound(name)),
        Err(e) => Err(e.into()),
    }
}

/// Lists all branches with their head commit metadata.
///
/// The ref namespace is enumerated directly from storage. A failing
/// metadata lookup for one branch degrades that entry to empty metadata
/// instead of aborting the whole listing.
pub fn list_branches(repo: &Repository) -> Result<Vec<BranchInfo>> {
    let mut branches = Vec::new();

    for (name, head) in repo.refs().list()? {
        let info = match repo.read_commit(&head) {
            Ok(commit) => BranchInfo {
                name,
                head,
                message: commit.message,
                author: format!("{} <{}>", commit.author.name, commit.author.email),
                date: commit.author.when,
            },
            Err(e) => {
                warn!(branch = %name, error = %e, "branch head metadata lookup failed");
                BranchInfo {
                    name,
                    head,
                    message: String::new(),
                    author: String::new(),
                    date: 0,
                }
            }
        };
        branches.push(info);
    }

    Ok(branches)
}

/// Returns the current branch name, falling back to the fixed default
/// when no branch pointer resolves.
pub fn current_branch(repo: &Repository) -> String {
    repo.refs().current_branch()
}
