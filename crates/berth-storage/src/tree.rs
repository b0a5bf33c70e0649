//! Tree object codec and traversal.
//!
//! Trees use git's binary entry format: `<mode> <name>\0<20-byte id>`,
//! with entries in git's canonical order (directory names compare as if
//! they ended with `/`). Producing any other order changes the tree hash
//! and makes otherwise-identical snapshots diverge.

use crate::{GitObject, ObjectId, ObjectType, Odb, Result, StorageError};
use std::collections::BTreeMap;

/// File modes git records in tree entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Regular file (100644).
    Regular,
    /// Executable file (100755).
    Executable,
    /// Symbolic link (120000).
    Symlink,
    /// Subdirectory (40000).
    Directory,
    /// Submodule commit reference (160000). Parsed but unsupported:
    /// dropped on re-serialization because the engine never materializes
    /// submodule checkouts.
    Gitlink,
}

impl FileMode {
    /// Returns the octal string git writes into tree entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Directory => "40000",
            Self::Gitlink => "160000",
        }
    }

    /// Parses a mode string from a tree entry.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "100644" | "100664" => Ok(Self::Regular),
            "100755" => Ok(Self::Executable),
            "120000" => Ok(Self::Symlink),
            "40000" | "040000" => Ok(Self::Directory),
            "160000" => Ok(Self::Gitlink),
            _ => Err(StorageError::InvalidObject(format!(
                "unknown file mode: {}",
                s
            ))),
        }
    }

    /// True for entries that reference another tree.
    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// A single entry in a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry file mode.
    pub mode: FileMode,
    /// Entry name (a single path component).
    pub name: String,
    /// Referenced blob or tree.
    pub id: ObjectId,
}

/// A tree walked into a flat `path -> (mode, id)` map of leaf entries.
pub type FlatTree = BTreeMap<String, (FileMode, ObjectId)>;

/// Parses the binary payload of a tree object.
pub fn parse(data: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let space = data[pos..]
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| StorageError::InvalidObject("tree entry missing mode".into()))?;
        let mode = std::str::from_utf8(&data[pos..pos + space])
            .map_err(|_| StorageError::InvalidObject("tree mode is not utf-8".into()))?;
        let mode = FileMode::parse(mode)?;
        pos += space + 1;

        let null = data[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| StorageError::InvalidObject("tree entry missing name".into()))?;
        let name = std::str::from_utf8(&data[pos..pos + null])
            .map_err(|_| StorageError::InvalidObject("tree name is not utf-8".into()))?
            .to_string();
        pos += null + 1;

        if pos + 20 > data.len() {
            return Err(StorageError::InvalidObject("tree entry truncated".into()));
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(&data[pos..pos + 20]);
        pos += 20;

        entries.push(TreeEntry {
            mode,
            name,
            id: ObjectId::from_bytes(id),
        });
    }

    Ok(entries)
}

/// Serializes tree entries into the binary tree payload.
///
/// Entries are sorted into git's canonical order and unsupported
/// (gitlink) entries are dropped.
pub fn serialize(entries: &[TreeEntry]) -> Vec<u8> {
    let mut kept: Vec<&TreeEntry> = entries
        .iter()
        .filter(|e| e.mode != FileMode::Gitlink)
        .collect();
    kept.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let mut data = Vec::new();
    for entry in kept {
        data.extend_from_slice(entry.mode.as_str().as_bytes());
        data.push(b' ');
        data.extend_from_slice(entry.name.as_bytes());
        data.push(0);
        data.extend_from_slice(entry.id.as_bytes());
    }
    data
}

fn sort_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.as_bytes().to_vec();
    if entry.mode.is_tree() {
        key.push(b'/');
    }
    key
}

/// Reads the tree with the given id from the database.
pub fn read(odb: &Odb, id: &ObjectId) -> Result<Vec<TreeEntry>> {
    let object = odb.read(id)?;
    if object.object_type != ObjectType::Tree {
        return Err(StorageError::InvalidObject(format!(
            "{} is a {}, expected tree",
            id,
            object.object_type.as_str()
        )));
    }
    parse(&object.data)
}

/// Walks a tree recursively into a flat map of leaf paths.
///
/// Gitlink entries are skipped: they reference commits in foreign
/// repositories this database cannot resolve.
pub fn flatten(odb: &Odb, id: &ObjectId) -> Result<FlatTree> {
    let mut flat = FlatTree::new();
    flatten_into(odb, id, "", &mut flat)?;
    Ok(flat)
}

fn flatten_into(odb: &Odb, id: &ObjectId, prefix: &str, flat: &mut FlatTree) -> Result<()> {
    for entry in read(odb, id)? {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", prefix, entry.name)
        };
        match entry.mode {
            FileMode::Directory => flatten_into(odb, &entry.id, &path, flat)?,
            FileMode::Gitlink => {}
            _ => {
                flat.insert(path, (entry.mode, entry.id));
            }
        }
    }
    Ok(())
}

/// Materializes a flat path map as nested tree objects, bottom-up, and
/// returns the root tree id.
pub fn write_flat(odb: &Odb, flat: &FlatTree) -> Result<ObjectId> {
    let entries: Vec<(&str, FileMode, ObjectId)> = flat
        .iter()
        .map(|(path, (mode, id))| (path.as_str(), *mode, *id))
        .collect();
    write_dir(odb, entries)
}

fn write_dir(odb: &Odb, entries: Vec<(&str, FileMode, ObjectId)>) -> Result<ObjectId> {
    let mut leaves: Vec<TreeEntry> = Vec::new();
    let mut subdirs: BTreeMap<&str, Vec<(&str, FileMode, ObjectId)>> = BTreeMap::new();

    for (path, mode, id) in entries {
        match path.split_once('/') {
            None => leaves.push(TreeEntry {
                mode,
                name: path.to_string(),
                id,
            }),
            Some((dir, rest)) => subdirs.entry(dir).or_default().push((rest, mode, id)),
        }
    }

    for (dir, sub) in subdirs {
        let sub_id = write_dir(odb, sub)?;
        leaves.push(TreeEntry {
            mode: FileMode::Directory,
            name: dir.to_string(),
            id: sub_id,
        });
    }

    let object = GitObject::new(ObjectType::Tree, serialize(&leaves));
    odb.write(&object)
}

/// Synchronized walk of two trees by path.
///
/// The visitor is called once per path present in either tree, with the
/// entry from each side or `None` where the path is absent.
pub fn walk_pair<F>(odb: &Odb, a: &ObjectId, b: &ObjectId, mut visitor: F) -> Result<()>
where
    F: FnMut(&str, Option<(FileMode, ObjectId)>, Option<(FileMode, ObjectId)>) -> Result<()>,
{
    let flat_a = flatten(odb, a)?;
    let flat_b = flatten(odb, b)?;

    let mut paths: Vec<&String> = flat_a.keys().chain(flat_b.keys()).collect();
    paths.sort();
    paths.dedup();

    for path in paths {
        visitor(path, flat_a.get(path).copied(), flat_b.get(path).copied())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn disk_odb() -> (TempDir, Odb) {
        let temp = TempDir::new().unwrap();
        let odb = Odb::new(temp.path().join("objects"));
        (temp, odb)
    }

    fn entry(mode: FileMode, name: &str, byte: u8) -> TreeEntry {
        TreeEntry {
            mode,
            name: name.to_string(),
            id: ObjectId::from_bytes([byte; 20]),
        }
    }

    #[test]
    fn test_codec_roundtrip() {
        let entries = vec![
            entry(FileMode::Regular, "README.md", 1),
            entry(FileMode::Directory, "src", 2),
            entry(FileMode::Executable, "build.sh", 3),
        ];
        let data = serialize(&entries);
        let parsed = parse(&data).unwrap();

        assert_eq!(parsed.len(), 3);
        assert!(parsed.iter().any(|e| e.name == "src" && e.mode.is_tree()));
    }

    #[test]
    fn test_canonical_ordering_directories_sort_with_slash() {
        // git orders "foo.txt" before the directory "foo" because the
        // directory compares as "foo/" and '.' < '/'.
        let entries = vec![
            entry(FileMode::Directory, "foo", 1),
            entry(FileMode::Regular, "foo.txt", 2),
        ];
        let parsed = parse(&serialize(&entries)).unwrap();
        assert_eq!(parsed[0].name, "foo.txt");
        assert_eq!(parsed[1].name, "foo");
    }

    #[test]
    fn test_gitlink_entries_are_dropped() {
        let entries = vec![
            entry(FileMode::Regular, "a.txt", 1),
            entry(FileMode::Gitlink, "vendored", 2),
        ];
        let parsed = parse(&serialize(&entries)).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "a.txt");
    }

    #[test]
    fn test_gitlink_parses() {
        let mut data = Vec::new();
        data.extend_from_slice(b"160000 sub\0");
        data.extend_from_slice(&[9u8; 20]);
        let parsed = parse(&data).unwrap();
        assert_eq!(parsed[0].mode, FileMode::Gitlink);
    }

    #[test]
    fn test_parse_truncated_entry() {
        let mut data = Vec::new();
        data.extend_from_slice(b"100644 short\0");
        data.extend_from_slice(&[1u8; 10]); // only half an id
        assert!(parse(&data).is_err());
    }

    #[test]
    fn test_flatten_and_write_flat_roundtrip() {
        let (_t, odb) = disk_odb();

        let mut flat = FlatTree::new();
        flat.insert(
            "README.md".to_string(),
            (FileMode::Regular, odb.write(&GitObject::blob(b"readme".to_vec())).unwrap()),
        );
        flat.insert(
            "src/main.rs".to_string(),
            (FileMode::Regular, odb.write(&GitObject::blob(b"fn main() {}".to_vec())).unwrap()),
        );
        flat.insert(
            "src/util/mod.rs".to_string(),
            (FileMode::Regular, odb.write(&GitObject::blob(b"// util".to_vec())).unwrap()),
        );

        let root = write_flat(&odb, &flat).unwrap();
        let reread = flatten(&odb, &root).unwrap();
        assert_eq!(reread, flat);
    }

    #[test]
    fn test_write_flat_is_deterministic() {
        let (_t, odb) = disk_odb();

        let blob = odb.write(&GitObject::blob(b"x".to_vec())).unwrap();
        let mut flat = FlatTree::new();
        flat.insert("a/b.txt".to_string(), (FileMode::Regular, blob));
        flat.insert("a/c.txt".to_string(), (FileMode::Regular, blob));

        let first = write_flat(&odb, &flat).unwrap();
        let second = write_flat(&odb, &flat).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_walk_pair_visits_union_of_paths() {
        let (_t, odb) = disk_odb();

        let blob_a = odb.write(&GitObject::blob(b"a".to_vec())).unwrap();
        let blob_b = odb.write(&GitObject::blob(b"b".to_vec())).unwrap();

        let mut left = FlatTree::new();
        left.insert("common.txt".to_string(), (FileMode::Regular, blob_a));
        left.insert("only-left.txt".to_string(), (FileMode::Regular, blob_a));
        let left_id = write_flat(&odb, &left).unwrap();

        let mut right = FlatTree::new();
        right.insert("common.txt".to_string(), (FileMode::Regular, blob_b));
        right.insert("only-right.txt".to_string(), (FileMode::Regular, blob_b));
        let right_id = write_flat(&odb, &right).unwrap();

        let mut seen = Vec::new();
        walk_pair(&odb, &left_id, &right_id, |path, a, b| {
            seen.push((path.to_string(), a.is_some(), b.is_some()));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                ("common.txt".to_string(), true, true),
                ("only-left.txt".to_string(), true, false),
                ("only-right.txt".to_string(), false, true),
            ]
        );
    }

    #[test]
    fn test_read_rejects_non_tree() {
        let (_t, odb) = disk_odb();
        let blob = odb.write(&GitObject::blob(b"not a tree".to_vec())).unwrap();
        assert!(read(&odb, &blob).is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_mode() -> impl Strategy<Value = FileMode> {
            prop_oneof![
                Just(FileMode::Regular),
                Just(FileMode::Executable),
                Just(FileMode::Symlink),
                Just(FileMode::Directory),
            ]
        }

        fn arb_entry() -> impl Strategy<Value = TreeEntry> {
            ("[a-zA-Z0-9._-]{1,16}", arb_mode(), any::<[u8; 20]>()).prop_map(
                |(name, mode, id)| TreeEntry {
                    mode,
                    name,
                    id: ObjectId::from_bytes(id),
                },
            )
        }

        proptest! {
            #[test]
            fn codec_roundtrip_preserves_entries(entries in proptest::collection::vec(arb_entry(), 0..24)) {
                let parsed = parse(&serialize(&entries)).unwrap();
                // Serialization orders canonically, so compare as sets.
                let mut expected: Vec<(String, &str)> = entries
                    .iter()
                    .map(|e| (e.name.clone(), e.mode.as_str()))
                    .collect();
                let mut got: Vec<(String, &str)> = parsed
                    .iter()
                    .map(|e| (e.name.clone(), e.mode.as_str()))
                    .collect();
                expected.sort();
                got.sort();
                prop_assert_eq!(expected, got);
            }

            #[test]
            fn serialization_is_canonical(entries in proptest::collection::vec(arb_entry(), 0..24)) {
                let mut shuffled = entries.clone();
                shuffled.reverse();
                prop_assert_eq!(serialize(&entries), serialize(&shuffled));
            }
        }
    }
}
