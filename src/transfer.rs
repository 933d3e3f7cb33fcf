//! graph transfer: reachability walks for fetch and push
//!
//! both directions are a BFS over the object graph. a commit's children
//! are its tree and its parents; a tree's children are its entry
//! digests; blobs are leaves.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::object::{self, Object, ObjectKind};
use crate::store::Store;

/// source of objects on the remote side of a fetch
pub trait FetchSource {
    fn fetch_object(&self, digest: &Digest) -> Result<Object>;
}

/// walk remote tips, fetching every object missing from the local store
///
/// presence of an object locally implies presence of its whole
/// reachable closure (the transitive-have assumption), so the walk
/// stops descending there. transport errors terminate the traversal.
pub fn fetch_pack(store: &Store, source: &impl FetchSource, remote_tips: &[Digest]) -> Result<()> {
    let mut visited = HashSet::new();
    let mut queue: VecDeque<Digest> = remote_tips.iter().copied().collect();
    let mut fetched = 0usize;

    while let Some(digest) = queue.pop_front() {
        if visited.contains(&digest) {
            continue;
        }
        if store.exists(&digest) {
            visited.insert(digest);
            continue;
        }

        let obj = source
            .fetch_object(&digest)
            .map_err(|e| Error::transport(format!("failed to fetch {}", digest.short()), e))?;
        store.put(obj.kind, &obj.data)?;
        visited.insert(digest);
        fetched += 1;

        enqueue_children(&obj, &mut queue)?;
    }

    debug!(fetched, tips = remote_tips.len(), "fetch walk complete");
    Ok(())
}

/// objects reachable from local tips and not stopped by the remote's
/// named tips, in BFS order
///
/// the `have` set is only the named remote tips, not their closure, so
/// shared subtrees behind other tips are re-sent; the receiving store
/// deduplicates them. a local object missing from the store is
/// corruption and fails the walk.
pub fn push_pack(
    store: &Store,
    local_tips: &[Digest],
    remote_tips: &[Digest],
) -> Result<Vec<Digest>> {
    let have: HashSet<Digest> = remote_tips.iter().copied().collect();
    let mut visited = HashSet::new();
    let mut result = Vec::new();
    let mut queue: VecDeque<Digest> = local_tips.iter().copied().collect();

    while let Some(digest) = queue.pop_front() {
        if visited.contains(&digest) {
            continue;
        }
        // a tip the remote has implies it has the history behind it
        if have.contains(&digest) {
            continue;
        }

        let obj = store.get(&digest).map_err(|e| match e {
            Error::ObjectNotFound(_) => {
                Error::transport(format!("local object missing: {}", digest.short()), e)
            }
            other => other,
        })?;

        result.push(digest);
        visited.insert(digest);

        enqueue_children(&obj, &mut queue)?;
    }

    debug!(count = result.len(), "push pack computed");
    Ok(result)
}

fn enqueue_children(obj: &Object, queue: &mut VecDeque<Digest>) -> Result<()> {
    match obj.kind {
        ObjectKind::Commit => {
            let commit = object::decode_commit(&obj.data)?;
            queue.push_back(commit.tree);
            for parent in commit.parents {
                queue.push_back(parent);
            }
        }
        ObjectKind::Tree => {
            let tree = object::decode_tree(&obj.data)?;
            for entry in tree.entries {
                queue.push_back(entry.digest);
            }
        }
        ObjectKind::Blob => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Commit, Tree, TreeEntry};
    use tempfile::tempdir;

    /// fetch source backed by another local store
    struct StoreSource<'a>(&'a Store);

    impl FetchSource for StoreSource<'_> {
        fn fetch_object(&self, digest: &Digest) -> Result<Object> {
            self.0.get(digest).map(|obj| (*obj).clone())
        }
    }

    /// fetch source that fails the test if consulted
    struct UnreachableSource;

    impl FetchSource for UnreachableSource {
        fn fetch_object(&self, digest: &Digest) -> Result<Object> {
            panic!("fetch_object called for {} on a source that must not be reached", digest);
        }
    }

    fn two_stores() -> (tempfile::TempDir, Store, Store) {
        let dir = tempdir().unwrap();
        let a = Store::new(dir.path().join("a"));
        let b = Store::new(dir.path().join("b"));
        (dir, a, b)
    }

    /// one commit with one file
    fn seed_commit(store: &Store, name: &str, content: &[u8], parents: Vec<Digest>) -> Digest {
        let blob = store.put_blob(content).unwrap();
        let tree = store
            .put_tree(&Tree::new(vec![TreeEntry {
                mode: 0o100644,
                name: name.to_string(),
                digest: blob,
            }]))
            .unwrap();
        store
            .put_commit(&Commit {
                tree,
                parents,
                author: "test".to_string(),
                email: "t@example.com".to_string(),
                timestamp: 0,
                message: "seed".to_string(),
            })
            .unwrap()
    }

    #[test]
    fn test_fetch_pack_copies_closure() {
        let (_dir, remote, local) = two_stores();

        let c1 = seed_commit(&remote, "f", b"v1", vec![]);
        let c2 = seed_commit(&remote, "f", b"v2", vec![c1]);

        fetch_pack(&local, &StoreSource(&remote), &[c2]).unwrap();

        // the whole closure landed: both commits, trees and blobs
        let commit2 = local.get_commit(&c2).unwrap();
        let tree2 = local.get_tree(&commit2.tree).unwrap();
        assert!(local.exists(&tree2.entries[0].digest));

        let commit1 = local.get_commit(&c1).unwrap();
        assert!(local.exists(&commit1.tree));
    }

    #[test]
    fn test_fetch_pack_stops_at_local_objects() {
        let (_dir, remote, local) = two_stores();

        let c1 = seed_commit(&remote, "f", b"v1", vec![]);
        // local already has the tip; the source must never be contacted
        fetch_pack(&local, &StoreSource(&remote), &[c1]).unwrap();
        fetch_pack(&local, &UnreachableSource, &[c1]).unwrap();
    }

    #[test]
    fn test_fetch_pack_missing_remote_object() {
        let (_dir, _remote, local) = two_stores();

        let ghost = Digest::from_bytes([5u8; 32]);
        struct EmptySource;
        impl FetchSource for EmptySource {
            fn fetch_object(&self, digest: &Digest) -> Result<Object> {
                Err(Error::ObjectNotFound(*digest))
            }
        }

        let result = fetch_pack(&local, &EmptySource, &[ghost]);
        assert!(matches!(result, Err(Error::TransportFault { .. })));
    }

    #[test]
    fn test_push_pack_excludes_remote_tips() {
        let (_dir, local, _remote) = two_stores();

        let c1 = seed_commit(&local, "f", b"v1", vec![]);
        let c2 = seed_commit(&local, "f", b"v2", vec![c1]);

        let pack = push_pack(&local, &[c2], &[c1]).unwrap();

        // c1 itself is excluded, c2 and its tree/blob are included
        assert!(pack.contains(&c2));
        assert!(!pack.contains(&c1));
        assert_eq!(pack[0], c2);
    }

    #[test]
    fn test_push_pack_full_graph_when_remote_empty() {
        let (_dir, local, _remote) = two_stores();

        let c1 = seed_commit(&local, "f", b"v1", vec![]);
        let c2 = seed_commit(&local, "f", b"v2", vec![c1]);

        let pack = push_pack(&local, &[c2], &[]).unwrap();

        // both commits, both trees, both blobs
        assert_eq!(pack.len(), 6);
        assert_eq!(pack[0], c2);
    }

    #[test]
    fn test_push_pack_resends_shared_objects_behind_have_tips() {
        // the have set is named tips only, so a blob shared with the
        // remote tip's tree is still emitted
        let (_dir, local, _remote) = two_stores();

        let shared_blob = local.put_blob(b"unchanged").unwrap();
        let tree1 = local
            .put_tree(&Tree::new(vec![TreeEntry {
                mode: 0o100644,
                name: "same".to_string(),
                digest: shared_blob,
            }]))
            .unwrap();
        let c1 = local
            .put_commit(&Commit {
                tree: tree1,
                parents: vec![],
                author: "t".to_string(),
                email: "t@example.com".to_string(),
                timestamp: 0,
                message: "one".to_string(),
            })
            .unwrap();

        // second commit reuses the same tree (and blob)
        let c2 = local
            .put_commit(&Commit {
                tree: tree1,
                parents: vec![c1],
                author: "t".to_string(),
                email: "t@example.com".to_string(),
                timestamp: 1,
                message: "two".to_string(),
            })
            .unwrap();

        let pack = push_pack(&local, &[c2], &[c1]).unwrap();

        // correct but not minimal: the shared tree and blob are re-sent
        assert!(pack.contains(&tree1));
        assert!(pack.contains(&shared_blob));
        assert!(!pack.contains(&c1));
    }

    #[test]
    fn test_push_pack_missing_local_object_is_fatal() {
        let (_dir, local, _remote) = two_stores();

        let ghost = Digest::from_bytes([9u8; 32]);
        let result = push_pack(&local, &[ghost], &[]);
        assert!(matches!(result, Err(Error::TransportFault { .. })));
    }
}
