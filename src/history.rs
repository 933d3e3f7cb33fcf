//! history traversal: first-parent walks, ancestry tests and LCA

use std::collections::{HashSet, VecDeque};

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::object::Commit;
use crate::store::Store;

/// first-parent walk from `start`
///
/// stops at a zero parent or after `limit` entries; `limit == 0` means
/// unbounded.
pub fn history(store: &Store, start: &Digest, limit: usize) -> Result<Vec<(Digest, Commit)>> {
    let mut out = Vec::new();
    let mut cursor = *start;

    while !cursor.is_zero() && (limit == 0 || out.len() < limit) {
        let commit = store.get_commit(&cursor)?;
        let next = commit.parents.first().copied().unwrap_or(Digest::ZERO);
        out.push((cursor, commit));
        cursor = next;
    }

    Ok(out)
}

/// true iff `ancestor` is reachable from `commit` over parent edges,
/// or equal to it
///
/// BFS over all parents. a commit the store cannot produce is a dead
/// end at that node, not a failure.
pub fn is_ancestor(store: &Store, ancestor: &Digest, commit: &Digest) -> bool {
    if ancestor == commit {
        return true;
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([*commit]);

    while let Some(digest) = queue.pop_front() {
        if !visited.insert(digest) {
            continue;
        }
        if digest == *ancestor {
            return true;
        }

        let Ok(commit) = store.get_commit(&digest) else {
            continue;
        };
        for parent in &commit.parents {
            if !parent.is_zero() {
                queue.push_back(*parent);
            }
        }
    }

    false
}

/// find a lowest common ancestor of two commits
///
/// builds the full ancestor set of `x` with a multi-parent BFS, then
/// BFS from `y` returns the first member found. FIFO order makes the
/// result deterministic; in criss-cross histories it is one of several
/// equally close ancestors, not necessarily the best.
pub fn find_lca(store: &Store, x: &Digest, y: &Digest) -> Result<Digest> {
    let mut x_ancestors = HashSet::new();
    let mut queue = VecDeque::from([*x]);

    while let Some(digest) = queue.pop_front() {
        if !x_ancestors.insert(digest) {
            continue;
        }
        let Ok(commit) = store.get_commit(&digest) else {
            continue;
        };
        for parent in &commit.parents {
            if !parent.is_zero() {
                queue.push_back(*parent);
            }
        }
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([*y]);

    while let Some(digest) = queue.pop_front() {
        if !visited.insert(digest) {
            continue;
        }
        if x_ancestors.contains(&digest) {
            return Ok(digest);
        }

        let Ok(commit) = store.get_commit(&digest) else {
            continue;
        };
        for parent in &commit.parents {
            if !parent.is_zero() {
                queue.push_back(*parent);
            }
        }
    }

    Err(Error::NoCommonAncestor)
}

/// fast-forward is possible when `base` is an ancestor of `target`
pub fn can_fast_forward(store: &Store, base: &Digest, target: &Digest) -> bool {
    is_ancestor(store, base, target)
}
