//! reference storage: named mutable pointers over immutable objects
//!
//! a ref is a file under `.asl/` whose contents are a hex digest plus a
//! trailing newline. HEAD is either symbolic (`ref: refs/heads/<name>`)
//! or detached (a bare hex digest). ref updates are atomic replaces.

use std::fs;
use std::path::PathBuf;

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::fsutil::atomic_write;
use crate::repo::Repository;

/// prefix for branch refs
pub const HEADS_PREFIX: &str = "refs/heads/";

/// resolved HEAD state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Head {
    /// symbolic: HEAD names a ref path, not yet resolved to a commit
    Branch(String),
    /// detached: HEAD holds a commit digest directly
    Detached(Digest),
}

impl Repository {
    /// parse HEAD without resolving the underlying ref
    pub fn head(&self) -> Result<Head> {
        let path = self.meta_path().join("HEAD");
        let content = fs::read_to_string(&path).map_err(|e| Error::StorageFault {
            path: path.clone(),
            source: e,
        })?;

        let content = content.trim_end();
        if let Some(target) = content.strip_prefix("ref: ") {
            Ok(Head::Branch(target.to_string()))
        } else {
            Ok(Head::Detached(Digest::from_hex(content)?))
        }
    }

    /// point HEAD at a branch (symbolic) or a commit (detached)
    pub fn set_head(&self, target: &Head) -> Result<()> {
        let content = match target {
            Head::Branch(ref_path) => format!("ref: {}\n", ref_path),
            Head::Detached(digest) => format!("{}\n", digest),
        };
        atomic_write(&self.meta_path().join("HEAD"), content.as_bytes())
    }

    /// read the digest a ref points to
    pub fn get_ref(&self, ref_path: &str) -> Result<Digest> {
        let path = self.ref_file(ref_path);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::BranchNotFound(ref_path.to_string())
            } else {
                Error::StorageFault { path: path.clone(), source: e }
            }
        })?;
        Digest::from_hex(content.trim_end())
    }

    /// point a ref at a digest, creating intermediate directories
    pub fn set_ref(&self, ref_path: &str, digest: &Digest) -> Result<()> {
        atomic_write(&self.ref_file(ref_path), format!("{}\n", digest).as_bytes())
    }

    /// resolve HEAD to a commit digest
    ///
    /// a symbolic HEAD whose branch file does not exist yet is the
    /// pre-first-commit state and surfaces as `BranchNotFound`.
    pub fn current_commit(&self) -> Result<Digest> {
        match self.head()? {
            Head::Branch(ref_path) => self.get_ref(&ref_path),
            Head::Detached(digest) => Ok(digest),
        }
    }

    /// name of the branch HEAD points at
    pub fn current_branch(&self) -> Result<String> {
        match self.head()? {
            Head::Branch(ref_path) => match ref_path.strip_prefix(HEADS_PREFIX) {
                Some(name) => Ok(name.to_string()),
                None => Err(Error::InvalidBranchName(ref_path)),
            },
            Head::Detached(_) => Err(Error::DetachedHead),
        }
    }

    /// list branch names (files directly under refs/heads)
    pub fn list_branches(&self) -> Result<Vec<String>> {
        let heads = self.meta_path().join(HEADS_PREFIX);
        let entries = match fs::read_dir(&heads) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(Error::StorageFault { path: heads, source: e }),
        };

        let mut branches = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::StorageFault {
                path: heads.clone(),
                source: e,
            })?;
            if entry.path().is_file() {
                branches.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        branches.sort();
        Ok(branches)
    }

    /// create a branch pointing at the current commit
    ///
    /// before any commit exists the new branch holds the zero digest,
    /// which downstream code treats as "no commits yet".
    pub fn create_branch(&self, name: &str) -> Result<()> {
        validate_branch_name(name)?;

        let ref_path = format!("{}{}", HEADS_PREFIX, name);
        if self.ref_file(&ref_path).exists() {
            return Err(Error::BranchExists(name.to_string()));
        }

        let target = match self.current_commit() {
            Ok(digest) => digest,
            Err(Error::BranchNotFound(_)) => Digest::ZERO,
            Err(e) => return Err(e),
        };

        self.set_ref(&ref_path, &target)
    }

    /// switch HEAD to an existing branch
    pub fn switch_branch(&self, name: &str) -> Result<()> {
        let ref_path = format!("{}{}", HEADS_PREFIX, name);
        if !self.ref_file(&ref_path).exists() {
            return Err(Error::BranchNotFound(name.to_string()));
        }
        self.set_head(&Head::Branch(ref_path))
    }

    fn ref_file(&self, ref_path: &str) -> PathBuf {
        self.meta_path().join(ref_path)
    }
}

fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "HEAD" {
        return Err(Error::InvalidBranchName(name.to_string()));
    }
    Ok(())
}
