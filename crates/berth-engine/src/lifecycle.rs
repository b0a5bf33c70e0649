//! Bare repository lifecycle: initialization, server-config enablement,
//! layout repair, and hook installation.

use crate::commit::{create_commit, FileChange};
use crate::{EngineError, Result};
use berth_storage::{ObjectId, Repository, Signature};
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

/// Initializes a bare repository at `path` with the given default branch.
///
/// After creating the layout, the `http.receivepack` flag must be
/// durably enabled or native clients cannot push. Enablement is
/// two-tier: write the config file, verify the value by parsing it back
/// through an independent code path, and on verification failure fall
/// back to the native `git config` tool and re-verify. If both tiers
/// fail verification, initialization fails loudly rather than leaving
/// the repository silently unwritable.
pub fn init_repository(path: impl AsRef<Path>, default_branch: &str) -> Result<Repository> {
    let path = path.as_ref();
    fs::create_dir_all(path.join("objects").join("info"))?;
    fs::create_dir_all(path.join("objects").join("pack"))?;
    fs::create_dir_all(path.join("refs").join("heads"))?;
    fs::create_dir_all(path.join("hooks"))?;
    fs::write(
        path.join("HEAD"),
        format!("ref: refs/heads/{}\n", default_branch),
    )?;

    // Tier 1: direct config write. Failure here is not yet fatal; the
    // native tool below gets its turn before init gives up.
    if let Err(e) = fs::write(
        path.join("config"),
        "[core]\n\
         \trepositoryformatversion = 0\n\
         \tbare = true\n\
         [http]\n\
         \treceivepack = true\n",
    ) {
        warn!(path = %path.display(), error = %e, "direct config write failed");
    }

    if !verify_receivepack(path) {
        // Tier 2: the native tool.
        warn!(path = %path.display(), "config readback missing receivepack, falling back to git config");
        let status = Command::new("git")
            .arg("--git-dir")
            .arg(path)
            .args(["config", "http.receivepack", "true"])
            .status();
        let ran = matches!(status, Ok(s) if s.success());
        if !ran || !verify_receivepack(path) {
            return Err(EngineError::InitFailed(format!(
                "could not enable http.receivepack for {}; pushes would be rejected",
                path.display()
            )));
        }
    }

    install_hooks(path, default_branch);
    info!(path = %path.display(), default_branch, "initialized bare repository");
    Repository::open(path).map_err(Into::into)
}

/// Verifies `http.receivepack` by parsing the config file directly,
/// independent of however it was written. An unreadable config is
/// unverified.
fn verify_receivepack(path: &Path) -> bool {
    let content = match fs::read_to_string(path.join("config")) {
        Ok(c) => c,
        Err(_) => return false,
    };

    let mut in_http = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_http = line.eq_ignore_ascii_case("[http]");
            continue;
        }
        if in_http {
            if let Some((key, value)) = line.split_once('=') {
                if key.trim().eq_ignore_ascii_case("receivepack")
                    && value.trim().eq_ignore_ascii_case("true")
                {
                    return true;
                }
            }
        }
    }
    false
}

/// Creates the single-file root commit on the repository's default branch.
pub fn create_initial_commit(repo: &Repository, author: &Signature) -> Result<ObjectId> {
    let branch = repo.refs().current_branch();
    let commit_id = create_commit(
        repo,
        &branch,
        &[FileChange::new("README.md", b"# New repository\n".to_vec())],
        "Initial commit",
        author,
    )?;
    normalize_layout(repo.path())?;
    Ok(commit_id)
}

/// Repairs a repository whose object database was nested under a stray
/// `.git/` subdirectory.
///
/// Some import paths write `refs` and `objects` under `<repo>/.git`
/// instead of the repository root. `git http-backend` only sees objects
/// at the root, so the nested contents are copied up and the stray
/// directory removed. A clean layout is left untouched.
pub fn normalize_layout(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let nested = path.join(".git");
    if !nested.is_dir() {
        return Ok(());
    }

    for sub in ["objects", "refs"] {
        let from = nested.join(sub);
        if from.is_dir() {
            copy_dir_contents(&from, &path.join(sub))?;
        }
    }
    fs::remove_dir_all(&nested)?;
    debug!(path = %path.display(), "normalized nested repository layout");
    Ok(())
}

fn copy_dir_contents(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_contents(&entry.path(), &target)?;
        } else if !target.exists() {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Installs the push-time validation hook, best-effort.
///
/// The hook rejects deletion of the default branch at push time. Failure
/// to install only degrades enforcement timing (the same policy is
/// checked again at the workflow layer), so it never blocks repository
/// creation.
fn install_hooks(path: &Path, default_branch: &str) {
    let script = format!(
        "#!/bin/sh\n\
         # Installed by berth. Rejects deletion of the default branch.\n\
         zero=0000000000000000000000000000000000000000\n\
         while read old new ref; do\n\
         \tif [ \"$ref\" = \"refs/heads/{}\" ] && [ \"$new\" = \"$zero\" ]; then\n\
         \t\techo \"refusing to delete {}\" >&2\n\
         \t\texit 1\n\
         \tfi\n\
         done\n\
         exit 0\n",
        default_branch, default_branch
    );

    let hook_path = path.join("hooks").join("pre-receive");
    if let Err(e) = fs::write(&hook_path, script) {
        warn!(error = %e, "pre-receive hook installation failed; enforcement deferred to workflow layer");
        return;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(&hook_path, fs::Permissions::from_mode(0o755)) {
            warn!(error = %e, "could not mark pre-receive hook executable");
        }
    }
}
