//! asl - content-addressed version control core
//!
//! a compressed, deduplicating object database keyed by cryptographic
//! digest, with a commit DAG and mutable named refs layered on top,
//! a three-way merge engine built on a Myers line differ, and a sync
//! protocol that transfers graph reachability closures between stores.
//!
//! # Core concepts
//!
//! - **Blob**: opaque file contents, content-addressed
//! - **Tree**: an ordered list of `(mode, name, digest)` entries
//! - **Commit**: a tree pointer with parent links and metadata
//! - **Ref**: a named mutable pointer to a commit, under `refs/heads/`
//! - **Digest**: SHA-256 over the framed object bytes; same bytes,
//!   same digest, single stored copy
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use asl::Repository;
//!
//! let repo = Repository::init(Path::new("/path/to/project")).unwrap();
//! let commit = repo.save(&[], "initial snapshot").unwrap();
//! println!("saved {}", commit.short());
//! ```

mod digest;
mod error;
mod fsutil;
mod object;
mod repo;
mod store;

pub mod diff;
pub mod history;
pub mod merge;
pub mod protocol;
pub mod refs;
pub mod remote;
pub mod snapshot;
pub mod transfer;

pub use digest::{digest_bytes, Digest};
pub use error::{Error, Result};
pub use object::{
    decode_commit, decode_tree, encode_commit, encode_tree, frame, parse_frame, Commit, Object,
    ObjectKind, Tree, TreeEntry,
};
pub use refs::{Head, HEADS_PREFIX};
pub use repo::{Repository, META_DIR};
pub use snapshot::{author_email, author_name, ChangeKind, MODE_EXECUTABLE, MODE_REGULAR};
pub use store::Store;
