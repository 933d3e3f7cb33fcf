//! object data model and canonical encoding
//!
//! the canonical form of every stored object is `<type> <payload>` where
//! `<type>` is the lowercase variant name. the object digest is computed
//! over that entire framed byte string, so identical content always
//! collapses to a single stored copy.

use serde::{Deserialize, Serialize};

use crate::digest::{digest_bytes, Digest};
use crate::{Error, Result};

/// the three object variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            other => Err(Error::InvalidObject(format!("unknown object type: {}", other))),
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// a stored object: variant tag, payload and the digest it is keyed by
///
/// this is also the wire record for the sync protocol (`{type, data, hash}`
/// with the payload base64-framed).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(rename = "hash")]
    pub digest: Digest,
}

impl Object {
    /// build an object from a payload, computing the digest over its frame
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let digest = digest_bytes(&frame(kind, &data));
        Self { kind, data, digest }
    }
}

/// canonical frame: `<type> <payload>`
pub fn frame(kind: ObjectKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(kind.as_str().len() + 1 + payload.len());
    out.extend_from_slice(kind.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload);
    out
}

/// split a frame back into variant tag and payload
pub fn parse_frame(data: &[u8]) -> Result<(ObjectKind, &[u8])> {
    let space = data
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| Error::InvalidObject("missing type prefix".to_string()))?;
    let kind = std::str::from_utf8(&data[..space])
        .map_err(|_| Error::InvalidObject("non-utf8 type prefix".to_string()))
        .and_then(ObjectKind::parse)?;
    Ok((kind, &data[space + 1..]))
}

/// a commit object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    /// root tree digest
    pub tree: Digest,
    /// parent commits; first parent is the mainline
    pub parents: Vec<Digest>,
    pub author: String,
    pub email: String,
    /// seconds since epoch
    pub timestamp: i64,
    pub message: String,
}

impl Commit {
    /// is this an initial commit (no parents)
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// is this a merge commit (multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

/// an entry in a tree object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// octal file mode (0o100644 regular, 0o100755 executable)
    pub mode: u32,
    /// path component, no embedded NUL
    pub name: String,
    /// blob or subtree digest
    pub digest: Digest,
}

/// a tree object: an ordered list of entries
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// serialize a commit
///
/// line-oriented text: a `tree` line, zero or more `parent` lines, an
/// `author` line, a blank line, then the message.
pub fn encode_commit(commit: &Commit) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("tree {}\n", commit.tree));
    for parent in &commit.parents {
        out.push_str(&format!("parent {}\n", parent));
    }
    out.push_str(&format!(
        "author {} <{}> {}\n",
        commit.author, commit.email, commit.timestamp
    ));
    out.push('\n');
    out.push_str(&commit.message);
    out.push('\n');
    out.into_bytes()
}

/// deserialize a commit
pub fn decode_commit(data: &[u8]) -> Result<Commit> {
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::InvalidCommit("non-utf8 commit".to_string()))?;
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() < 4 {
        return Err(Error::InvalidCommit("truncated commit".to_string()));
    }

    let mut tree = Digest::ZERO;
    let mut parents = Vec::new();
    let mut author = String::new();
    let mut email = String::new();
    let mut timestamp = 0i64;
    let mut message_start = None;

    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() {
            message_start = Some(i + 1);
            break;
        }

        let (key, value) = match line.split_once(' ') {
            Some(kv) => kv,
            None => continue,
        };

        match key {
            "tree" => {
                tree = Digest::from_hex(value)
                    .map_err(|e| Error::InvalidCommit(format!("invalid tree hash: {}", e)))?;
            }
            "parent" => {
                parents.push(
                    Digest::from_hex(value)
                        .map_err(|e| Error::InvalidCommit(format!("invalid parent hash: {}", e)))?,
                );
            }
            "author" => {
                // "Name <email> timestamp"
                let email_start = value
                    .find('<')
                    .ok_or_else(|| Error::InvalidCommit("invalid author format".to_string()))?;
                let email_end = value
                    .find('>')
                    .ok_or_else(|| Error::InvalidCommit("invalid author format".to_string()))?;
                if email_end < email_start {
                    return Err(Error::InvalidCommit("invalid author format".to_string()));
                }
                author = value[..email_start].trim().to_string();
                email = value[email_start + 1..email_end].to_string();
                timestamp = value[email_end + 1..]
                    .trim()
                    .parse()
                    .map_err(|_| Error::InvalidCommit("invalid author timestamp".to_string()))?;
            }
            _ => {}
        }
    }

    let message = match message_start {
        Some(start) if start < lines.len() => lines[start..].join("\n").trim().to_string(),
        _ => String::new(),
    };

    Ok(Commit {
        tree,
        parents,
        author,
        email,
        timestamp,
        message,
    })
}

/// serialize a tree
///
/// per-entry records `"<octal-mode> <name>\0<32-byte-digest>"`, concatenated
/// with no separators. entries keep their input order.
pub fn encode_tree(tree: &Tree) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in &tree.entries {
        out.extend_from_slice(format!("{:o} {}\0", entry.mode, entry.name).as_bytes());
        out.extend_from_slice(entry.digest.as_bytes());
    }
    out
}

/// deserialize a tree
pub fn decode_tree(data: &[u8]) -> Result<Tree> {
    let mut entries = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        let nul = match rest.iter().position(|&b| b == 0) {
            Some(i) if i + 33 <= rest.len() => i,
            _ => break,
        };

        let header = std::str::from_utf8(&rest[..nul])
            .map_err(|_| Error::InvalidObject("non-utf8 tree entry".to_string()))?;
        let (mode_str, name) = header
            .split_once(' ')
            .ok_or_else(|| Error::InvalidObject("malformed tree entry".to_string()))?;
        let mode = u32::from_str_radix(mode_str, 8)
            .map_err(|_| Error::InvalidObject("invalid tree entry mode".to_string()))?;

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&rest[nul + 1..nul + 33]);

        entries.push(TreeEntry {
            mode,
            name: name.to_string(),
            digest: Digest::from_bytes(digest),
        });
        rest = &rest[nul + 33..];
    }

    Ok(Tree { entries })
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(byte: u8) -> Digest {
        Digest::from_bytes([byte; 32])
    }

    #[test]
    fn test_commit_roundtrip() {
        let commit = Commit {
            tree: digest_of(1),
            parents: vec![digest_of(2)],
            author: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            timestamp: 1234567890,
            message: "initial commit".to_string(),
        };

        let encoded = encode_commit(&commit);
        let decoded = decode_commit(&encoded).unwrap();
        assert_eq!(commit, decoded);
    }

    #[test]
    fn test_commit_roundtrip_no_parents() {
        let commit = Commit {
            tree: digest_of(1),
            parents: vec![],
            author: "Bob".to_string(),
            email: "bob@localhost".to_string(),
            timestamp: 0,
            message: "root".to_string(),
        };

        let decoded = decode_commit(&encode_commit(&commit)).unwrap();
        assert!(decoded.is_root());
        assert_eq!(commit, decoded);
    }

    #[test]
    fn test_commit_roundtrip_merge() {
        let commit = Commit {
            tree: digest_of(1),
            parents: vec![digest_of(2), digest_of(3)],
            author: "Carol".to_string(),
            email: "carol@example.com".to_string(),
            timestamp: 99,
            message: "Merge branch 'feature'".to_string(),
        };

        let decoded = decode_commit(&encode_commit(&commit)).unwrap();
        assert!(decoded.is_merge());
        assert_eq!(decoded.parents, vec![digest_of(2), digest_of(3)]);
    }

    #[test]
    fn test_commit_multiline_message() {
        let commit = Commit {
            tree: digest_of(1),
            parents: vec![],
            author: "a".to_string(),
            email: "e".to_string(),
            timestamp: 1,
            message: "subject\n\nbody line one\nbody line two".to_string(),
        };

        let decoded = decode_commit(&encode_commit(&commit)).unwrap();
        assert_eq!(decoded.message, commit.message);
    }

    #[test]
    fn test_commit_decode_truncated() {
        assert!(decode_commit(b"tree").is_err());
        assert!(decode_commit(b"").is_err());
    }

    #[test]
    fn test_tree_roundtrip() {
        let tree = Tree::new(vec![
            TreeEntry {
                mode: 0o100644,
                name: "README".to_string(),
                digest: digest_of(5),
            },
            TreeEntry {
                mode: 0o100755,
                name: "build.sh".to_string(),
                digest: digest_of(6),
            },
        ]);

        let decoded = decode_tree(&encode_tree(&tree)).unwrap();
        assert_eq!(tree, decoded);
    }

    #[test]
    fn test_tree_roundtrip_empty() {
        let tree = Tree::default();
        let decoded = decode_tree(&encode_tree(&tree)).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_tree_preserves_entry_order() {
        let tree = Tree::new(vec![
            TreeEntry {
                mode: 0o100644,
                name: "zebra".to_string(),
                digest: digest_of(1),
            },
            TreeEntry {
                mode: 0o100644,
                name: "apple".to_string(),
                digest: digest_of(2),
            },
        ]);

        let decoded = decode_tree(&encode_tree(&tree)).unwrap();
        assert_eq!(decoded.entries[0].name, "zebra");
        assert_eq!(decoded.entries[1].name, "apple");
    }

    #[test]
    fn test_frame_roundtrip() {
        let framed = frame(ObjectKind::Blob, b"hello");
        assert_eq!(framed, b"blob hello");

        let (kind, payload) = parse_frame(&framed).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn test_frame_unknown_type() {
        assert!(parse_frame(b"widget data").is_err());
        assert!(parse_frame(b"nospace").is_err());
    }

    #[test]
    fn test_object_digest_over_frame() {
        let obj = Object::new(ObjectKind::Blob, b"hello".to_vec());
        assert_eq!(obj.digest, crate::digest::digest_bytes(b"blob hello"));
    }

    #[test]
    fn test_object_wire_roundtrip() {
        let obj = Object::new(ObjectKind::Commit, b"payload".to_vec());
        let json = serde_json::to_string(&obj).unwrap();
        assert!(json.contains("\"type\":\"commit\""));

        let parsed: Object = serde_json::from_str(&json).unwrap();
        assert_eq!(obj, parsed);
    }
}
