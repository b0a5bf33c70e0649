//! Two-tree diff and unified patch generation.

use crate::Result;
use berth_storage::{walk_pair, ObjectId, Repository};
use serde::Serialize;
use similar::TextDiff;
use tracing::warn;

/// Number of context lines around each hunk.
const CONTEXT_LINES: usize = 3;

/// How a path changed between the two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present only in the new tree.
    Added,
    /// Present only in the old tree.
    Deleted,
    /// Present in both with differing content.
    Modified,
}

/// A single changed file.
#[derive(Debug, Clone, Serialize)]
pub struct FileDiff {
    /// Path relative to the repository root.
    pub path: String,
    /// Change classification.
    pub kind: ChangeKind,
    /// Unified patch text, or a placeholder for binary/failed entries.
    pub patch: String,
    /// Added line count (excluding the `+++` header).
    pub additions: usize,
    /// Removed line count (excluding the `---` header).
    pub deletions: usize,
    /// True when either side contains an embedded NUL byte.
    pub binary: bool,
}

/// Whole-diff totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffSummary {
    /// Number of changed files.
    pub files_changed: usize,
    /// Total added lines.
    pub additions: usize,
    /// Total removed lines.
    pub deletions: usize,
}

/// A computed two-tree diff.
#[derive(Debug, Clone, Serialize)]
pub struct Diff {
    /// Per-file changes, ordered by path.
    pub files: Vec<FileDiff>,
    /// Totals across all files.
    pub summary: DiffSummary,
}

/// Compares two trees by path.
///
/// Paths present in exactly one tree are added/deleted; paths present in
/// both with differing blob hashes are modified; equal hashes are
/// skipped without reading content. A failure while generating one
/// file's patch degrades that entry to a placeholder instead of failing
/// the whole diff.
pub fn diff(repo: &Repository, tree_a: &ObjectId, tree_b: &ObjectId) -> Result<Diff> {
    let mut files = Vec::new();

    walk_pair(repo.odb(), tree_a, tree_b, |path, old, new| {
        let (kind, old_id, new_id) = match (old, new) {
            (None, Some((_, id))) => (ChangeKind::Added, None, Some(id)),
            (Some((_, id)), None) => (ChangeKind::Deleted, Some(id), None),
            (Some((_, a)), Some((_, b))) => {
                if a == b {
                    return Ok(());
                }
                (ChangeKind::Modified, Some(a), Some(b))
            }
            (None, None) => return Ok(()),
        };

        files.push(file_diff(repo, path, kind, old_id, new_id));
        Ok(())
    })?;

    let summary = DiffSummary {
        files_changed: files.len(),
        additions: files.iter().map(|f| f.additions).sum(),
        deletions: files.iter().map(|f| f.deletions).sum(),
    };

    Ok(Diff { files, summary })
}

/// Diffs the trees of two commits.
pub fn diff_commits(repo: &Repository, old: &ObjectId, new: &ObjectId) -> Result<Diff> {
    let old_tree = repo.read_commit(old)?.tree;
    let new_tree = repo.read_commit(new)?.tree;
    diff(repo, &old_tree, &new_tree)
}

fn file_diff(
    repo: &Repository,
    path: &str,
    kind: ChangeKind,
    old_id: Option<ObjectId>,
    new_id: Option<ObjectId>,
) -> FileDiff {
    match generate_patch(repo, path, old_id, new_id) {
        Ok(Some((patch, additions, deletions))) => FileDiff {
            path: path.to_string(),
            kind,
            patch,
            additions,
            deletions,
            binary: false,
        },
        Ok(None) => FileDiff {
            path: path.to_string(),
            kind,
            patch: format!("Binary files a/{} and b/{} differ\n", path, path),
            additions: 0,
            deletions: 0,
            binary: true,
        },
        Err(e) => {
            warn!(path, error = %e, "patch generation failed");
            FileDiff {
                path: path.to_string(),
                kind,
                patch: "error generating patch\n".to_string(),
                additions: 0,
                deletions: 0,
                binary: false,
            }
        }
    }
}

/// Generates a unified patch for one file.
///
/// Returns `None` when either side is binary (contains a NUL byte).
fn generate_patch(
    repo: &Repository,
    path: &str,
    old_id: Option<ObjectId>,
    new_id: Option<ObjectId>,
) -> Result<Option<(String, usize, usize)>> {
    let old_bytes = match old_id {
        Some(id) => repo.odb().read(&id)?.data,
        None => bytes::Bytes::new(),
    };
    let new_bytes = match new_id {
        Some(id) => repo.odb().read(&id)?.data,
        None => bytes::Bytes::new(),
    };

    if old_bytes.contains(&0) || new_bytes.contains(&0) {
        return Ok(None);
    }

    let old_text = String::from_utf8_lossy(&old_bytes);
    let new_text = String::from_utf8_lossy(&new_bytes);

    let text_diff = TextDiff::from_lines(old_text.as_ref(), new_text.as_ref());
    let patch = text_diff
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&format!("a/{}", path), &format!("b/{}", path))
        .to_string();

    let (additions, deletions) = count_changes(&patch);
    Ok(Some((patch, additions, deletions)))
}

/// Counts `+`/`-` patch lines, excluding the `+++`/`---` file headers.
fn count_changes(patch: &str) -> (usize, usize) {
    let mut additions = 0;
    let mut deletions = 0;
    for line in patch.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if line.starts_with('+') {
            additions += 1;
        } else if line.starts_with('-') {
            deletions += 1;
        }
    }
    (additions, deletions)
}
