//! Branch integration strategies.
//!
//! All three strategies operate directly on the object graph: no working
//! directory, no textual conflict resolution. Tree resolution always
//! takes the source branch's content wholesale (merge commit and squash)
//! or replays it verbatim (rebase), so divergent target-side changes are
//! silently discarded. That limitation is intentional and documented,
//! not detected.

use crate::{EngineError, Result};
use berth_storage::{Commit, ObjectId, Repository, Signature};
use std::collections::HashSet;
use tracing::info;

fn resolve_branch(repo: &Repository, branch: &str) -> Result<ObjectId> {
    repo.refs()
        .read(branch)?
        .ok_or_else(|| EngineError::BranchNotFound(branch.to_string()))
}

fn wrap<T>(result: std::result::Result<T, berth_storage::StorageError>) -> Result<T> {
    result.map_err(|e| EngineError::MergeFailed(e.to_string()))
}

/// Finds the nearest common ancestor of `a` and `b` along first-parent
/// lineage only.
///
/// All first-parent ancestors of `a` are collected into a set, then
/// `b`'s first-parent chain is walked until a member is found. On
/// histories containing earlier merges this may select a non-minimal
/// ancestor; the behavior is preserved as observed.
pub fn merge_base(repo: &Repository, a: &ObjectId, b: &ObjectId) -> Result<Option<ObjectId>> {
    let mut ancestors = HashSet::new();
    let mut cursor = Some(*a);
    while let Some(id) = cursor {
        ancestors.insert(id);
        cursor = repo.read_commit(&id)?.parents.first().copied();
    }

    let mut cursor = Some(*b);
    while let Some(id) = cursor {
        if ancestors.contains(&id) {
            return Ok(Some(id));
        }
        cursor = repo.read_commit(&id)?.parents.first().copied();
    }

    Ok(None)
}

/// Merges `source` into `target` with a two-parent merge commit.
///
/// The new commit's tree is the source head's tree and its parents are
/// `[target_head, source_head]`, target first. The target ref is
/// force-updated as the final step.
pub fn merge_commit(
    repo: &Repository,
    source: &str,
    target: &str,
    user: &Signature,
) -> Result<ObjectId> {
    let source_head = resolve_branch(repo, source)?;
    let target_head = resolve_branch(repo, target)?;

    let source_commit = wrap(repo.read_commit(&source_head))?;
    let commit = Commit {
        tree: source_commit.tree,
        parents: vec![target_head, source_head],
        author: user.clone(),
        committer: user.clone(),
        message: format!("Merge branch '{}' into {}", source, target),
    };
    let merge_id = wrap(repo.write_commit(&commit))?;

    wrap(repo.refs().write(target, merge_id, true))?;
    info!(source, target, merge = %merge_id, "merge commit created");
    Ok(merge_id)
}

/// Squash-merges `source` into `target`.
///
/// Produces exactly one new commit carrying the source head's tree with
/// the target's prior head as its single parent; the source branch's
/// individual history is discarded.
pub fn squash_merge(
    repo: &Repository,
    source: &str,
    target: &str,
    user: &Signature,
) -> Result<ObjectId> {
    let source_head = resolve_branch(repo, source)?;
    let target_head = resolve_branch(repo, target)?;

    let source_commit = wrap(repo.read_commit(&source_head))?;
    let commit = Commit {
        tree: source_commit.tree,
        parents: vec![target_head],
        author: user.clone(),
        committer: user.clone(),
        message: format!("Squash merge branch '{}' into {}", source, target),
    };
    let squash_id = wrap(repo.write_commit(&commit))?;

    wrap(repo.refs().write(target, squash_id, true))?;
    info!(source, target, squash = %squash_id, "squash merge created");
    Ok(squash_id)
}

/// Rebase-merges `source` onto `target`.
///
/// Every commit from the merge base (exclusive) to the source head
/// (inclusive) is replayed in order, oldest first, as a new commit with
/// the original's tree and message, the original author preserved, and
/// the committer set to the merging user. The target ref is
/// force-updated to the final replayed commit.
pub fn rebase_merge(
    repo: &Repository,
    source: &str,
    target: &str,
    user: &Signature,
) -> Result<ObjectId> {
    let source_head = resolve_branch(repo, source)?;
    let target_head = resolve_branch(repo, target)?;

    let base = merge_base(repo, &target_head, &source_head)?
        .ok_or(EngineError::NoCommonAncestor)?;

    // Source-side commits to replay, newest first, then reversed.
    let mut to_replay = Vec::new();
    let mut cursor = source_head;
    while cursor != base {
        let commit = wrap(repo.read_commit(&cursor))?;
        let parent = commit.parents.first().copied();
        to_replay.push(commit);
        cursor = match parent {
            Some(p) => p,
            None => break,
        };
    }
    to_replay.reverse();

    let mut new_head = target_head;
    for original in to_replay {
        let replayed = Commit {
            tree: original.tree,
            parents: vec![new_head],
            author: original.author,
            committer: user.clone(),
            message: original.message,
        };
        new_head = wrap(repo.write_commit(&replayed))?;
    }

    wrap(repo.refs().write(target, new_head, true))?;
    info!(source, target, head = %new_head, "rebase merge completed");
    Ok(new_head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::{create_commit, FileChange};
    use crate::create_branch;
    use tempfile::TempDir;

    fn repo() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("objects")).unwrap();
        std::fs::create_dir_all(temp.path().join("refs/heads")).unwrap();
        std::fs::write(temp.path().join("HEAD"), "ref: refs/heads/main\n").unwrap();
        let repo = Repository::open(temp.path()).unwrap();
        (temp, repo)
    }

    fn sig(name: &str) -> Signature {
        Signature {
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            when: 1234567890,
            offset: "+0000".into(),
        }
    }

    fn commit_file(repo: &Repository, branch: &str, path: &str, content: &str, msg: &str) -> ObjectId {
        create_commit(
            repo,
            branch,
            &[FileChange::new(path, content.as_bytes().to_vec())],
            msg,
            &sig("Alice"),
        )
        .unwrap()
    }

    #[test]
    fn test_merge_commit_parents_and_tree() {
        let (_t, repo) = repo();
        let a = commit_file(&repo, "main", "README.md", "readme\n", "A");
        create_branch(&repo, "feature", Some("main")).unwrap();
        let b = commit_file(&repo, "feature", "new.txt", "new\n", "B");

        let c = merge_commit(&repo, "feature", "main", &sig("Maintainer")).unwrap();

        let merge = repo.read_commit(&c).unwrap();
        assert_eq!(merge.parents, vec![a, b]);
        let feature_tree = repo.read_commit(&b).unwrap().tree;
        assert_eq!(merge.tree, feature_tree);
        assert_eq!(repo.refs().read("main").unwrap(), Some(c));
        // Source branch untouched.
        assert_eq!(repo.refs().read("feature").unwrap(), Some(b));
    }

    #[test]
    fn test_squash_merge_single_parent() {
        let (_t, repo) = repo();
        let main_head = commit_file(&repo, "main", "README.md", "readme\n", "base");
        create_branch(&repo, "feature", Some("main")).unwrap();
        commit_file(&repo, "feature", "f1.txt", "1\n", "one");
        commit_file(&repo, "feature", "f2.txt", "2\n", "two");
        let feature_head = commit_file(&repo, "feature", "f3.txt", "3\n", "three");

        let squash = squash_merge(&repo, "feature", "main", &sig("Maintainer")).unwrap();

        let commit = repo.read_commit(&squash).unwrap();
        assert_eq!(commit.parents, vec![main_head]);
        let feature_tree = repo.read_commit(&feature_head).unwrap().tree;
        assert_eq!(commit.tree, feature_tree);
        assert_eq!(repo.refs().read("main").unwrap(), Some(squash));
    }

    #[test]
    fn test_rebase_replays_in_order_preserving_author() {
        let (_t, repo) = repo();
        commit_file(&repo, "main", "README.md", "readme\n", "M");
        create_branch(&repo, "feature", Some("main")).unwrap();

        // Diverge main past the base.
        let n = commit_file(&repo, "main", "main.txt", "main\n", "N");

        let c1 = create_commit(
            &repo,
            "feature",
            &[FileChange::new("c1.txt", b"1\n".to_vec())],
            "C1",
            &sig("Bob"),
        )
        .unwrap();
        let c2 = create_commit(
            &repo,
            "feature",
            &[FileChange::new("c2.txt", b"2\n".to_vec())],
            "C2",
            &sig("Bob"),
        )
        .unwrap();

        let new_head = rebase_merge(&repo, "feature", "main", &sig("Maintainer")).unwrap();

        // Two fresh commits atop N, oldest first.
        let replayed_c2 = repo.read_commit(&new_head).unwrap();
        assert_eq!(replayed_c2.message, "C2");
        assert_eq!(replayed_c2.author.name, "Bob");
        assert_eq!(replayed_c2.committer.name, "Maintainer");
        assert_eq!(replayed_c2.tree, repo.read_commit(&c2).unwrap().tree);

        let replayed_c1 = repo.read_commit(&replayed_c2.parents[0]).unwrap();
        assert_eq!(replayed_c1.message, "C1");
        assert_eq!(replayed_c1.author.name, "Bob");
        assert_eq!(replayed_c1.parents, vec![n]);
        assert_eq!(replayed_c1.tree, repo.read_commit(&c1).unwrap().tree);

        assert_eq!(repo.refs().read("main").unwrap(), Some(new_head));
        // Replays are new commits, not the originals.
        assert_ne!(new_head, c2);
    }

    #[test]
    fn test_rebase_without_common_ancestor_fails_without_ref_update() {
        let (_t, repo) = repo();
        let main_head = commit_file(&repo, "main", "a.txt", "a\n", "A");
        // An unrelated root history.
        let orphan_head = commit_file(&repo, "orphan", "b.txt", "b\n", "B");

        let result = rebase_merge(&repo, "orphan", "main", &sig("Maintainer"));
        assert!(matches!(result, Err(EngineError::NoCommonAncestor)));

        assert_eq!(repo.refs().read("main").unwrap(), Some(main_head));
        assert_eq!(repo.refs().read("orphan").unwrap(), Some(orphan_head));
    }

    #[test]
    fn test_merge_base_first_parent_only() {
        let (_t, repo) = repo();
        let m = commit_file(&repo, "main", "a.txt", "a\n", "M");
        create_branch(&repo, "feature", Some("main")).unwrap();
        let f = commit_file(&repo, "feature", "b.txt", "b\n", "F");
        let n = commit_file(&repo, "main", "c.txt", "c\n", "N");

        assert_eq!(merge_base(&repo, &n, &f).unwrap(), Some(m));
        // A commit is its own ancestor.
        assert_eq!(merge_base(&repo, &m, &m).unwrap(), Some(m));
    }

    #[test]
    fn test_missing_branch_is_precondition_error() {
        let (_t, repo) = repo();
        commit_file(&repo, "main", "a.txt", "a\n", "A");

        for result in [
            merge_commit(&repo, "ghost", "main", &sig("U")),
            squash_merge(&repo, "main", "ghost", &sig("U")),
            rebase_merge(&repo, "ghost", "main", &sig("U")),
        ] {
            assert!(matches!(result, Err(EngineError::BranchNotFound(_))));
        }
    }
}
