//! Branch ref database over a bare repository's `refs/heads` namespace.

use crate::{ObjectId, Result, StorageError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Branch name used when no branch pointer resolves.
pub const DEFAULT_BRANCH: &str = "main";

/// Ref database rooted at a bare repository directory.
///
/// Reads are defensive: the loose ref file is consulted first, then
/// `packed-refs`, and finally the caller-supplied string is accepted as a
/// literal commit hash. Each tier routes around a known gap rather than
/// guessing: loose files are authoritative but disappear after ref
/// packing, and callers legitimately pass raw hashes where branch names
/// are accepted.
#[derive(Debug, Clone)]
pub struct RefDb {
    root: PathBuf,
}

impl RefDb {
    /// Opens the ref database for the repository at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn heads_dir(&self) -> PathBuf {
        self.root.join("refs").join("heads")
    }

    fn loose_path(&self, branch: &str) -> PathBuf {
        self.heads_dir().join(branch)
    }

    /// Validates a branch name before it is used as a relative path.
    pub fn validate_name(branch: &str) -> Result<()> {
        let ok = !branch.is_empty()
            && !branch.starts_with('/')
            && !branch.ends_with('/')
            && !branch.starts_with('.')
            && !branch.contains("..")
            && !branch.contains('\\')
            && branch
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'));
        if ok {
            Ok(())
        } else {
            Err(StorageError::InvalidRef(branch.to_string()))
        }
    }

    /// Resolves a branch name to a commit id.
    ///
    /// A missing branch is a normal case for callers ("branch doesn't
    /// exist yet"), so absence is `Ok(None)` rather than an error.
    pub fn read(&self, branch: &str) -> Result<Option<ObjectId>> {
        // Tier 1: loose ref file, read directly from storage.
        if Self::validate_name(branch).is_ok() {
            match fs::read_to_string(self.loose_path(branch)) {
                Ok(content) => {
                    let content = content.trim();
                    if let Ok(id) = ObjectId::from_hex(content) {
                        return Ok(Some(id));
                    }
                    return Err(StorageError::InvalidRef(format!(
                        "refs/heads/{} does not contain a commit hash",
                        branch
                    )));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            // Tier 2: packed-refs, where loose files go after packing.
            if let Some(id) = self.read_packed(branch)? {
                return Ok(Some(id));
            }
        }

        // Tier 3: the caller may have handed us a literal commit hash.
        if branch.len() == 40 {
            if let Ok(id) = ObjectId::from_hex(branch) {
                debug!(given = branch, "resolved ref input as literal hash");
                return Ok(Some(id));
            }
        }

        Ok(None)
    }

    fn read_packed(&self, branch: &str) -> Result<Option<ObjectId>> {
        let full_name = format!("refs/heads/{}", branch);
        for (name, id) in self.parse_packed()? {
            if name == full_name {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn parse_packed(&self) -> Result<Vec<(String, ObjectId)>> {
        let path = self.root.join("packed-refs");
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut refs = Vec::new();
        for line in content.lines() {
            // '#' is the header, '^' lines are peeled tag targets.
            if line.starts_with('#') || line.starts_with('^') {
                continue;
            }
            if let Some((hex, name)) = line.split_once(' ') {
                if let Ok(id) = ObjectId::from_hex(hex.trim()) {
                    refs.push((name.trim().to_string(), id));
                }
            }
        }
        Ok(refs)
    }

    /// Points a branch at a commit.
    ///
    /// Without `force` the write fails if the branch already exists. This
    /// is the only operation that moves a branch, and it is always the
    /// final step of a structural mutation; concurrent forced writes are
    /// last-writer-wins.
    pub fn write(&self, branch: &str, id: ObjectId, force: bool) -> Result<()> {
        Self::validate_name(branch)?;
        if !force && self.read(branch)?.is_some() {
            return Err(StorageError::BranchExists(branch.to_string()));
        }

        let path = self.loose_path(branch);
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::InvalidRef(branch.to_string()))?;
        fs::create_dir_all(dir)?;

        let tmp = dir.join(format!(".tmp-ref-{}", std::process::id()));
        fs::write(&tmp, format!("{}\n", id.to_hex()))?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Removes a branch ref. Fails if the branch does not exist.
    pub fn delete(&self, branch: &str) -> Result<()> {
        Self::validate_name(branch)?;
        let path = self.loose_path(branch);
        let loose_existed = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let packed_existed = self.remove_packed(branch)?;
        if loose_existed || packed_existed {
            Ok(())
        } else {
            Err(StorageError::RefNotFound(branch.to_string()))
        }
    }

    fn remove_packed(&self, branch: &str) -> Result<bool> {
        let path = self.root.join("packed-refs");
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let needle = format!("refs/heads/{}", branch);
        let mut removed = false;
        let kept: Vec<&str> = content
            .lines()
            .filter(|line| {
                let matches = line
                    .split_once(' ')
                    .map(|(_, name)| name.trim() == needle)
                    .unwrap_or(false);
                if matches {
                    removed = true;
                }
                !matches
            })
            .collect();

        if removed {
            fs::write(&path, format!("{}\n", kept.join("\n")))?;
        }
        Ok(removed)
    }

    /// Enumerates all branches directly from storage.
    ///
    /// Both the loose heads directory and `packed-refs` are scanned so a
    /// packed-only branch still appears; a loose file wins over a packed
    /// entry for the same name.
    pub fn list(&self) -> Result<BTreeMap<String, ObjectId>> {
        let mut branches = BTreeMap::new();

        for (name, id) in self.parse_packed()? {
            if let Some(short) = name.strip_prefix("refs/heads/") {
                branches.insert(short.to_string(), id);
            }
        }

        let heads = self.heads_dir();
        if heads.exists() {
            collect_loose(&heads, &heads, &mut branches)?;
        }

        Ok(branches)
    }

    /// Returns the branch `HEAD` points at, or the fixed default when no
    /// branch pointer resolves.
    pub fn current_branch(&self) -> String {
        let head = self.root.join("HEAD");
        if let Ok(content) = fs::read_to_string(head) {
            if let Some(target) = content.trim().strip_prefix("ref: ") {
                if let Some(branch) = target.strip_prefix("refs/heads/") {
                    return branch.to_string();
                }
            }
        }
        DEFAULT_BRANCH.to_string()
    }
}

fn collect_loose(
    base: &Path,
    dir: &Path,
    branches: &mut BTreeMap<String, ObjectId>,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_loose(base, &path, branches)?;
            continue;
        }
        let name = match path.strip_prefix(base) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if name.starts_with(".tmp-") {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        if let Ok(id) = ObjectId::from_hex(content.trim()) {
            branches.insert(name, id);
        }
    }
    Ok(())
}
