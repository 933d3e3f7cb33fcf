//! content-addressed object store
//!
//! objects are zlib-compressed on disk at `objects/<xx>/<rest>` under the
//! store root; sharding by the first two hex characters caps the
//! per-directory file count. reads go through an in-memory cache under a
//! readers/writer lock. objects are immutable once written, so stale
//! reads cannot happen and duplicate writes of the same digest are safe.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::{debug, trace};

use crate::digest::{digest_bytes, Digest};
use crate::error::{Error, IoResultExt, Result};
use crate::object::{self, Commit, Object, ObjectKind, Tree};

/// the object database
pub struct Store {
    root: PathBuf,
    cache: RwLock<HashMap<Digest, Arc<Object>>>,
}

impl Store {
    /// open a store rooted at the repository metadata directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// store an object, returning its digest
    ///
    /// idempotent: if the digest is already present nothing is rewritten
    /// and the same digest is returned.
    pub fn put(&self, kind: ObjectKind, data: &[u8]) -> Result<Digest> {
        let framed = object::frame(kind, data);
        let digest = digest_bytes(&framed);

        let path = self.object_path(&digest);
        if path.exists() {
            trace!(%digest, "object already present");
            return Ok(digest);
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_path(dir)?;

        // write compressed bytes to a temp file, verify, then rename
        let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        {
            let file = File::create(&tmp).with_path(&tmp)?;
            let mut encoder = ZlibEncoder::new(file, Compression::default());
            encoder.write_all(&framed).with_path(&tmp)?;
            let file = encoder.finish().with_path(&tmp)?;
            file.sync_all().with_path(&tmp)?;
        }

        // invariant: the bytes we just wrote must decompress back to the
        // digest we derived. a mismatch here is corruption, not an error.
        let readback = read_compressed(&tmp)?;
        if digest_bytes(&readback) != digest {
            panic!("object store corruption: readback digest mismatch for {digest}");
        }

        fs::rename(&tmp, &path).with_path(&path)?;
        debug!(%digest, kind = %kind, bytes = data.len(), "object written");
        Ok(digest)
    }

    /// retrieve an object by digest
    pub fn get(&self, digest: &Digest) -> Result<Arc<Object>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(obj) = cache.get(digest) {
                trace!(%digest, "cache hit");
                return Ok(Arc::clone(obj));
            }
        }

        let path = self.object_path(digest);
        let compressed = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ObjectNotFound(*digest)
            } else {
                Error::StorageFault { path: path.clone(), source: e }
            }
        })?;

        let mut framed = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut framed)
            .with_path(&path)?;

        if digest_bytes(&framed) != *digest {
            return Err(Error::InvalidObject(format!(
                "stored bytes do not hash to {}",
                digest
            )));
        }

        let (kind, payload) = object::parse_frame(&framed)?;
        let obj = Arc::new(Object {
            kind,
            data: payload.to_vec(),
            digest: *digest,
        });

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(*digest, Arc::clone(&obj));
        }

        Ok(obj)
    }

    /// true if the object is in the cache or on disk
    pub fn exists(&self, digest: &Digest) -> bool {
        if let Ok(cache) = self.cache.read() {
            if cache.contains_key(digest) {
                return true;
            }
        }
        self.object_path(digest).exists()
    }

    /// store a blob
    pub fn put_blob(&self, data: &[u8]) -> Result<Digest> {
        self.put(ObjectKind::Blob, data)
    }

    /// encode and store a tree
    pub fn put_tree(&self, tree: &Tree) -> Result<Digest> {
        self.put(ObjectKind::Tree, &object::encode_tree(tree))
    }

    /// encode and store a commit
    pub fn put_commit(&self, commit: &Commit) -> Result<Digest> {
        self.put(ObjectKind::Commit, &object::encode_commit(commit))
    }

    /// retrieve a blob payload
    pub fn get_blob(&self, digest: &Digest) -> Result<Vec<u8>> {
        let obj = self.get(digest)?;
        if obj.kind != ObjectKind::Blob {
            return Err(Error::TypeMismatch {
                expected: ObjectKind::Blob.as_str(),
                found: obj.kind.as_str(),
            });
        }
        Ok(obj.data.clone())
    }

    /// retrieve and decode a tree
    pub fn get_tree(&self, digest: &Digest) -> Result<Tree> {
        let obj = self.get(digest)?;
        if obj.kind != ObjectKind::Tree {
            return Err(Error::TypeMismatch {
                expected: ObjectKind::Tree.as_str(),
                found: obj.kind.as_str(),
            });
        }
        object::decode_tree(&obj.data)
    }

    /// retrieve and decode a commit
    pub fn get_commit(&self, digest: &Digest) -> Result<Commit> {
        let obj = self.get(digest)?;
        if obj.kind != ObjectKind::Commit {
            return Err(Error::TypeMismatch {
                expected: ObjectKind::Commit.as_str(),
                found: obj.kind.as_str(),
            });
        }
        object::decode_commit(&obj.data)
    }

    fn object_path(&self, digest: &Digest) -> PathBuf {
        let (dir, file) = digest.to_path_components();
        self.root.join("objects").join(dir).join(file)
    }
}

fn read_compressed(path: &Path) -> Result<Vec<u8>> {
    let compressed = fs::read(path).with_path(path)?;
    let mut out = Vec::new();
    ZlibDecoder::new(&compressed[..])
        .read_to_end(&mut out)
        .with_path(path)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join(".asl"));
        (dir, store)
    }

    #[test]
    fn test_put_and_get() {
        let (_dir, store) = test_store();

        let digest = store.put(ObjectKind::Blob, b"hello").unwrap();
        let obj = store.get(&digest).unwrap();

        assert_eq!(obj.kind, ObjectKind::Blob);
        assert_eq!(obj.data, b"hello");
        assert_eq!(obj.digest, digest);
    }

    #[test]
    fn test_put_is_idempotent() {
        let (dir, store) = test_store();

        let d1 = store.put(ObjectKind::Blob, b"same bytes").unwrap();
        let d2 = store.put(ObjectKind::Blob, b"same bytes").unwrap();
        assert_eq!(d1, d2);

        // exactly one file under the shard
        let (shard, _) = d1.to_path_components();
        let shard_dir = dir.path().join(".asl/objects").join(shard);
        let count = fs::read_dir(shard_dir).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_same_payload_different_type_different_digest() {
        let (_dir, store) = test_store();

        let blob = store.put(ObjectKind::Blob, b"bytes").unwrap();
        let tree = store.put(ObjectKind::Tree, b"bytes").unwrap();
        assert_ne!(blob, tree);
    }

    #[test]
    fn test_get_not_found() {
        let (_dir, store) = test_store();

        let missing = Digest::from_bytes([7u8; 32]);
        assert!(matches!(
            store.get(&missing),
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_exists() {
        let (_dir, store) = test_store();

        let digest = store.put_blob(b"present").unwrap();
        assert!(store.exists(&digest));
        assert!(!store.exists(&Digest::from_bytes([9u8; 32])));
    }

    #[test]
    fn test_cache_serves_second_read() {
        let (dir, store) = test_store();

        let digest = store.put_blob(b"cached").unwrap();
        store.get(&digest).unwrap();

        // remove the backing file; the cache must still answer
        let (shard, file) = digest.to_path_components();
        fs::remove_file(dir.path().join(".asl/objects").join(shard).join(file)).unwrap();

        let obj = store.get(&digest).unwrap();
        assert_eq!(obj.data, b"cached");
        assert!(store.exists(&digest));
    }

    #[test]
    fn test_typed_roundtrip() {
        let (_dir, store) = test_store();

        let commit = Commit {
            tree: Digest::ZERO,
            parents: vec![],
            author: "a".to_string(),
            email: "a@example.com".to_string(),
            timestamp: 1234567890,
            message: "test".to_string(),
        };

        let digest = store.put_commit(&commit).unwrap();
        let read = store.get_commit(&digest).unwrap();
        assert_eq!(commit, read);
    }

    #[test]
    fn test_typed_getter_rejects_wrong_kind() {
        let (_dir, store) = test_store();

        let blob = store.put_blob(b"not a commit").unwrap();
        assert!(matches!(
            store.get_commit(&blob),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.get_tree(&blob),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_disk_bytes_are_compressed() {
        let (dir, store) = test_store();

        let payload = vec![b'x'; 4096];
        let digest = store.put_blob(&payload).unwrap();

        let (shard, file) = digest.to_path_components();
        let on_disk = fs::read(dir.path().join(".asl/objects").join(shard).join(file)).unwrap();
        assert!(on_disk.len() < payload.len());
    }
}
