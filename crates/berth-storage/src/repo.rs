//! Repository handle bundling the object database and ref database.

use crate::{tree, Commit, FlatTree, GitObject, ObjectId, ObjectType, Odb, RefDb, Result, StorageError, TreeEntry};
use std::path::{Path, PathBuf};

/// A bare repository on disk.
///
/// One instance per managed project. The repository is the unit the
/// engine mutates: immutable content-addressed objects plus a small set
/// of mutable branch refs.
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
    odb: Odb,
    refs: RefDb,
}

impl Repository {
    /// Opens an existing bare repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.join("objects").is_dir() {
            return Err(StorageError::RepoNotFound(path.display().to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
            odb: Odb::new(path.join("objects")),
            refs: RefDb::new(path),
        })
    }

    /// Returns the repository directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the object database.
    pub fn odb(&self) -> &Odb {
        &self.odb
    }

    /// Returns the ref database.
    pub fn refs(&self) -> &RefDb {
        &self.refs
    }

    /// Writes a blob and returns its id.
    pub fn write_blob(&self, content: impl Into<bytes::Bytes>) -> Result<ObjectId> {
        self.odb.write(&GitObject::blob(content))
    }

    /// Writes a tree from explicit entries and returns its id.
    pub fn write_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId> {
        let object = GitObject::new(ObjectType::Tree, tree::serialize(entries));
        self.odb.write(&object)
    }

    /// Materializes a flat path map as nested trees; returns the root id.
    pub fn write_flat_tree(&self, flat: &FlatTree) -> Result<ObjectId> {
        tree::write_flat(&self.odb, flat)
    }

    /// Walks a tree into a flat path map.
    pub fn flatten_tree(&self, id: &ObjectId) -> Result<FlatTree> {
        tree::flatten(&self.odb, id)
    }

    /// Writes a commit object and returns its id.
    ///
    /// The ref move is intentionally not part of this call: callers
    /// update the branch as the final step of their mutation so no
    /// partial state is ever visible.
    pub fn write_commit(&self, commit: &Commit) -> Result<ObjectId> {
        if !self.odb.contains(&commit.tree) {
            return Err(StorageError::ObjectNotFound(format!(
                "commit tree {}",
                commit.tree
            )));
        }
        let object = GitObject::new(ObjectType::Commit, commit.serialize());
        self.odb.write(&object)
    }

    /// Reads and parses a commit.
    pub fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        let object = self.odb.read(id)?;
        if object.object_type != ObjectType::Commit {
            return Err(StorageError::InvalidObject(format!(
                "{} is a {}, expected commit",
                id,
                object.object_type.as_str()
            )));
        }
        Commit::parse(&object.data)
    }
}
