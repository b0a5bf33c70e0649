//! On-disk loose object database.
//!
//! Objects are stored zlib-compressed under `objects/xx/yyyy...` where
//! `xx` is the first hex byte of the id. This is the layout that
//! `git http-backend` reads, so anything written here is immediately
//! visible to native clients.

use crate::{GitObject, ObjectId, ObjectType, Result, StorageError};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Loose object database rooted at a repository's `objects` directory.
#[derive(Debug, Clone)]
pub struct Odb {
    root: PathBuf,
}

impl Odb {
    /// Opens the object database under `objects_dir`.
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: objects_dir.into(),
        }
    }

    /// Returns the database root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Writes an object and returns its ID.
    ///
    /// Identical content always hashes identically, so a write of an
    /// existing object is a no-op and the stored bytes are never touched.
    pub fn write(&self, object: &GitObject) -> Result<ObjectId> {
        let path = self.object_path(&object.id);
        if path.exists() {
            return Ok(object.id);
        }

        let compressed = compress(object)?;
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::InvalidObject("object path has no parent".into()))?;
        fs::create_dir_all(dir)?;

        // Write to a temp file then rename so a partial write is never
        // visible under the object's final name.
        let tmp = dir.join(format!(".tmp-{}", std::process::id()));
        fs::write(&tmp, &compressed)?;
        fs::rename(&tmp, &path)?;

        Ok(object.id)
    }

    /// Reads an object by ID.
    pub fn read(&self, id: &ObjectId) -> Result<GitObject> {
        let path = self.object_path(id);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::ObjectNotFound(id.to_hex()));
            }
            Err(e) => return Err(e.into()),
        };
        let object = decompress(&compressed)?;
        if object.id != *id {
            return Err(StorageError::InvalidObject(format!(
                "object {} hashed to {}",
                id, object.id
            )));
        }
        Ok(object)
    }

    /// Checks whether an object exists.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).exists()
    }
}

/// Compresses an object into the loose on-disk representation.
fn compress(object: &GitObject) -> Result<Vec<u8>> {
    let header = format!("{} {}\0", object.object_type.as_str(), object.data.len());
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(header.as_bytes())
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    encoder
        .write_all(&object.data)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| StorageError::Compression(e.to_string()))
}

/// Decompresses a loose object file.
fn decompress(compressed: &[u8]) -> Result<GitObject> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| StorageError::Compression(e.to_string()))?;

    // Parse header: "type size\0data"
    let null_pos = decompressed
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| StorageError::InvalidObject("missing null byte in header".to_string()))?;

    let header = String::from_utf8_lossy(&decompressed[..null_pos]);
    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 {
        return Err(StorageError::InvalidObject(format!(
            "invalid header: {}",
            header
        )));
    }

    let object_type = ObjectType::parse(parts[0])?;
    let size: usize = parts[1]
        .parse()
        .map_err(|_| StorageError::InvalidObject("invalid size".to_string()))?;

    let data = Bytes::from(decompressed[null_pos + 1..].to_vec());
    if data.len() != size {
        return Err(StorageError::InvalidObject(format!(
            "size mismatch: header says {}, got {}",
            size,
            data.len()
        )));
    }
    Ok(GitObject::new(object_type, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn odb() -> (TempDir, Odb) {
        let temp = TempDir::new().unwrap();
        let odb = Odb::new(temp.path().join("objects"));
        (temp, odb)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_t, odb) = odb();
        let blob = GitObject::blob(b"Hello, World!".to_vec());
        let id = odb.write(&blob).unwrap();

        let read = odb.read(&id).unwrap();
        assert_eq!(read.object_type, ObjectType::Blob);
        assert_eq!(read.data.as_ref(), b"Hello, World!");
    }

    #[test]
    fn test_write_is_idempotent() {
        let (_t, odb) = odb();
        let blob = GitObject::blob(b"same content".to_vec());

        let first = odb.write(&blob).unwrap();
        let second = odb.write(&blob).unwrap();
        assert_eq!(first, second);
        assert!(odb.contains(&first));
    }

    #[test]
    fn test_read_missing_object() {
        let (_t, odb) = odb();
        let id = ObjectId::from_bytes([7u8; 20]);
        let result = odb.read(&id);
        assert!(matches!(result, Err(StorageError::ObjectNotFound(_))));
    }

    #[test]
    fn test_fanout_layout() {
        let (_t, odb) = odb();
        let blob = GitObject::blob(b"hello\n".to_vec());
        odb.write(&blob).unwrap();

        // "hello\n" hashes to ce0136..., so the file lands under objects/ce/
        let path = odb.root().join("ce").join(&blob.id.to_hex()[2..]);
        assert!(path.exists());
    }

    #[test]
    fn test_compression_roundtrip() {
        let original = GitObject::blob(b"Hello, World!".to_vec());
        let compressed = compress(&original).unwrap();
        let decompressed = decompress(&compressed).unwrap();

        assert_eq!(original.id, decompressed.id);
        assert_eq!(original.object_type, decompressed.object_type);
        assert_eq!(original.data, decompressed.data);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress(b"not zlib at all").is_err());
    }
}
