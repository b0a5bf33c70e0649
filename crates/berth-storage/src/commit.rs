//! Commit object codec.

use crate::{ObjectId, Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// An author or committer identity with a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Seconds since the Unix epoch.
    pub when: i64,
    /// Timezone offset, e.g. `+0000`.
    pub offset: String,
}

impl Signature {
    /// Creates a signature timestamped now, in UTC.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        let when = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            name: name.into(),
            email: email.into(),
            when,
            offset: "+0000".to_string(),
        }
    }

    fn parse(line: &str) -> Result<Self> {
        // "Name <email> 1234567890 +0000"
        let open = line
            .find('<')
            .ok_or_else(|| StorageError::InvalidObject("signature missing '<'".into()))?;
        let close = line
            .find('>')
            .ok_or_else(|| StorageError::InvalidObject("signature missing '>'".into()))?;
        let name = line[..open].trim().to_string();
        let email = line[open + 1..close].to_string();

        let rest = line[close + 1..].trim();
        let mut parts = rest.split_whitespace();
        let when = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StorageError::InvalidObject("signature missing timestamp".into()))?;
        let offset = parts.next().unwrap_or("+0000").to_string();

        Ok(Self {
            name,
            email,
            when,
            offset,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name, self.email, self.when, self.offset
        )
    }
}

/// A parsed commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Root tree of the snapshot.
    pub tree: ObjectId,
    /// Parent commits; first parent is the mainline.
    pub parents: Vec<ObjectId>,
    /// Author identity.
    pub author: Signature,
    /// Committer identity.
    pub committer: Signature,
    /// Commit message.
    pub message: String,
}

impl Commit {
    /// Serializes the commit into its canonical git text form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut content = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            content.push_str(&format!("parent {}\n", parent));
        }
        content.push_str(&format!("author {}\n", self.author));
        content.push_str(&format!("committer {}\n", self.committer));
        content.push('\n');
        content.push_str(&self.message);
        content.into_bytes()
    }

    /// Parses a commit object payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| StorageError::InvalidObject("commit is not utf-8".into()))?;

        let (headers, message) = match text.split_once("\n\n") {
            Some((h, m)) => (h, m.to_string()),
            None => (text.trim_end_matches('\n'), String::new()),
        };

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            if let Some(hex) = line.strip_prefix("tree ") {
                tree = Some(ObjectId::from_hex(hex.trim())?);
            } else if let Some(hex) = line.strip_prefix("parent ") {
                parents.push(ObjectId::from_hex(hex.trim())?);
            } else if let Some(sig) = line.strip_prefix("author ") {
                author = Some(Signature::parse(sig)?);
            } else if let Some(sig) = line.strip_prefix("committer ") {
                committer = Some(Signature::parse(sig)?);
            }
            // Unknown headers (gpgsig, encoding) are tolerated and ignored.
        }

        let tree = tree.ok_or_else(|| StorageError::InvalidObject("commit missing tree".into()))?;
        let author =
            author.ok_or_else(|| StorageError::InvalidObject("commit missing author".into()))?;
        let committer = committer.unwrap_or_else(|| author.clone());

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(name: &str) -> Signature {
        Signature {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            when: 1234567890,
            offset: "+0000".to_string(),
        }
    }

    #[test]
    fn test_commit_roundtrip() {
        let commit = Commit {
            tree: ObjectId::from_bytes([1u8; 20]),
            parents: vec![ObjectId::from_bytes([2u8; 20]), ObjectId::from_bytes([3u8; 20])],
            author: sig("Alice"),
            committer: sig("Bob"),
            message: "Merge feature into main\n\nLonger body here.\n".to_string(),
        };

        let parsed = Commit::parse(&commit.serialize()).unwrap();
        assert_eq!(parsed, commit);
    }

    #[test]
    fn test_root_commit_has_no_parents() {
        let commit = Commit {
            tree: ObjectId::from_bytes([1u8; 20]),
            parents: vec![],
            author: sig("Alice"),
            committer: sig("Alice"),
            message: "Initial commit".to_string(),
        };

        let data = commit.serialize();
        assert!(!String::from_utf8_lossy(&data).contains("parent"));

        let parsed = Commit::parse(&data).unwrap();
        assert!(parsed.parents.is_empty());
    }

    #[test]
    fn test_signature_display_and_parse() {
        let s = sig("Alice");
        let rendered = s.to_string();
        assert_eq!(rendered, "Alice <alice@example.com> 1234567890 +0000");
        assert_eq!(Signature::parse(&rendered).unwrap(), s);
    }

    #[test]
    fn test_parse_tolerates_unknown_headers() {
        let text = format!(
            "tree {}\nauthor A <a@b.c> 1 +0000\ncommitter A <a@b.c> 1 +0000\nencoding utf-8\n\nmsg",
            "1".repeat(40)
        );
        let parsed = Commit::parse(text.as_bytes()).unwrap();
        assert_eq!(parsed.message, "msg");
    }

    #[test]
    fn test_parse_missing_tree_fails() {
        let text = "author A <a@b.c> 1 +0000\ncommitter A <a@b.c> 1 +0000\n\nmsg";
        assert!(Commit::parse(text.as_bytes()).is_err());
    }

    #[test]
    fn test_signature_now_has_utc_offset() {
        let s = Signature::now("Alice", "alice@example.com");
        assert_eq!(s.offset, "+0000");
        assert!(s.when > 0);
    }
}
