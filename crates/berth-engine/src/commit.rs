//! Snapshot commit builder.
//!
//! Every commit is a full tree snapshot materialized from the parent's
//! flattened tree plus a flat set of file changes, never a sparse delta.

use crate::{EngineError, Result};
use berth_storage::{Commit, FileMode, FlatTree, ObjectId, Repository, Signature};
use bytes::Bytes;

/// A single file write in a commit's change set.
#[derive(Debug, Clone)]
pub struct FileChange {
    /// Path relative to the repository root.
    pub path: String,
    /// New file content.
    pub content: Bytes,
}

impl FileChange {
    /// Creates a file change.
    pub fn new(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

fn validate_path(path: &str) -> Result<()> {
    let ok = !path.is_empty()
        && !path.starts_with('/')
        && !path.ends_with('/')
        && !path.split('/').any(|c| c.is_empty() || c == "." || c == "..");
    if ok {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(format!("bad file path: {}", path)))
    }
}

/// Creates a commit on `branch` from a flat file-change set.
///
/// The branch's current head, when present, supplies the single parent
/// and the base tree; each input file becomes a fresh blob upserted into
/// the flattened tree as a regular file. A branch that does not exist
/// yet is created with a root commit. All object writes happen before
/// the ref moves, so a failure leaves the branch untouched.
pub fn create_commit(
    repo: &Repository,
    branch: &str,
    files: &[FileChange],
    message: &str,
    author: &Signature,
) -> Result<ObjectId> {
    for file in files {
        validate_path(&file.path)?;
    }

    let head = repo.refs().read(branch)?;

    let mut flat = match head {
        Some(parent_id) => {
            let parent = repo.read_commit(&parent_id)?;
            repo.flatten_tree(&parent.tree)?
        }
        None => FlatTree::new(),
    };

    for file in files {
        let blob = repo.write_blob(file.content.clone())?;
        flat.insert(file.path.clone(), (FileMode::Regular, blob));
    }

    let tree = repo.write_flat_tree(&flat)?;
    let commit = Commit {
        tree,
        parents: head.into_iter().collect(),
        author: author.clone(),
        committer: author.clone(),
        message: message.to_string(),
    };
    let commit_id = repo.write_commit(&commit)?;

    // Last step: nothing before this point is visible on the branch.
    repo.refs().write(branch, commit_id, true)?;
    Ok(commit_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("objects")).unwrap();
        std::fs::create_dir_all(temp.path().join("refs/heads")).unwrap();
        let repo = Repository::open(temp.path()).unwrap();
        (temp, repo)
    }

    fn sig() -> Signature {
        Signature {
            name: "Alice".into(),
            email: "alice@example.com".into(),
            when: 1234567890,
            offset: "+0000".into(),
        }
    }

    #[test]
    fn test_root_commit_creates_branch() {
        let (_t, repo) = repo();

        let id = create_commit(
            &repo,
            "main",
            &[FileChange::new("README.md", b"hi\n".to_vec())],
            "Initial commit",
            &sig(),
        )
        .unwrap();

        assert_eq!(repo.refs().read("main").unwrap(), Some(id));
        let commit = repo.read_commit(&id).unwrap();
        assert!(commit.parents.is_empty());
        assert_eq!(commit.message, "Initial commit");
    }

    #[test]
    fn test_child_commit_has_one_parent_and_full_snapshot() {
        let (_t, repo) = repo();

        let root = create_commit(
            &repo,
            "main",
            &[FileChange::new("README.md", b"hi\n".to_vec())],
            "Initial commit",
            &sig(),
        )
        .unwrap();

        let child = create_commit(
            &repo,
            "main",
            &[FileChange::new("src/main.rs", b"fn main() {}\n".to_vec())],
            "Add main.rs",
            &sig(),
        )
        .unwrap();

        let commit = repo.read_commit(&child).unwrap();
        assert_eq!(commit.parents, vec![root]);

        // The snapshot keeps the untouched file from the parent tree.
        let flat = repo.flatten_tree(&commit.tree).unwrap();
        assert!(flat.contains_key("README.md"));
        assert!(flat.contains_key("src/main.rs"));
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let (_t, repo) = repo();

        create_commit(
            &repo,
            "main",
            &[FileChange::new("file.txt", b"v1".to_vec())],
            "v1",
            &sig(),
        )
        .unwrap();
        let second = create_commit(
            &repo,
            "main",
            &[FileChange::new("file.txt", b"v2".to_vec())],
            "v2",
            &sig(),
        )
        .unwrap();

        let commit = repo.read_commit(&second).unwrap();
        let flat = repo.flatten_tree(&commit.tree).unwrap();
        let (_, blob) = flat.get("file.txt").unwrap();
        let content = repo.odb().read(blob).unwrap();
        assert_eq!(content.data.as_ref(), b"v2");
    }

    #[test]
    fn test_invalid_path_rejected_before_any_write() {
        let (_t, repo) = repo();

        for bad in ["/abs.txt", "a/../b.txt", "", "dir/", "./x"] {
            let result = create_commit(
                &repo,
                "main",
                &[FileChange::new(bad, b"x".to_vec())],
                "bad",
                &sig(),
            );
            assert!(result.is_err(), "path {:?} should be rejected", bad);
        }

        // Nothing was committed, the branch still does not exist.
        assert!(repo.refs().read("main").unwrap().is_none());
    }

    #[test]
    fn test_commit_author_preserved() {
        let (_t, repo) = repo();
        let id = create_commit(
            &repo,
            "main",
            &[FileChange::new("a.txt", b"a".to_vec())],
            "msg",
            &sig(),
        )
        .unwrap();

        let commit = repo.read_commit(&id).unwrap();
        assert_eq!(commit.author.name, "Alice");
        assert_eq!(commit.committer.name, "Alice");
    }
}
