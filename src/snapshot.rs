//! snapshot creation and working tree operations
//!
//! `save` turns the working tree into blob+tree+commit objects and
//! advances the current branch. per-path hashing fans out over a worker
//! pool feeding a bounded result channel; the first worker error is
//! returned after the pool drains.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam::channel::bounded;
use tracing::debug;
use walkdir::WalkDir;

use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::object::{Commit, ObjectKind, Tree, TreeEntry};
use crate::refs::HEADS_PREFIX;
use crate::repo::{Repository, META_DIR};

/// mode for a regular file
pub const MODE_REGULAR: u32 = 0o100644;
/// mode for an executable file
pub const MODE_EXECUTABLE: u32 = 0o100755;

/// how a path changed between two trees
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl Repository {
    /// create a commit from the given paths (all tracked files when empty)
    /// and advance the current branch to it
    pub fn save(&self, paths: &[String], message: &str) -> Result<Digest> {
        if message.is_empty() {
            return Err(Error::InvalidCommit("commit message cannot be empty".to_string()));
        }
        // a conflicted merge must finish via continue or abort first
        if crate::merge::in_progress(self) {
            return Err(Error::MergeInProgress);
        }

        let files = if paths.is_empty() {
            self.list_all_files()?
        } else {
            paths.to_vec()
        };
        if files.is_empty() {
            return Err(Error::NothingToCommit);
        }

        let tree = self.build_tree(&files)?;
        let tree_digest = self.store().put_tree(&tree)?;

        let parents = match self.current_commit() {
            Ok(digest) if !digest.is_zero() => vec![digest],
            Ok(_) => vec![],
            Err(Error::BranchNotFound(_)) => vec![],
            Err(e) => return Err(e),
        };

        let commit = Commit {
            tree: tree_digest,
            parents,
            author: author_name(),
            email: author_email(),
            timestamp: unix_now(),
            message: message.to_string(),
        };
        let digest = self.store().put_commit(&commit)?;

        let branch = self.current_branch()?;
        self.set_ref(&format!("{}{}", HEADS_PREFIX, branch), &digest)?;

        debug!(%digest, branch = %branch, files = files.len(), "snapshot saved");
        Ok(digest)
    }

    /// move the current branch back to the tip's first parent
    ///
    /// the working tree is left untouched. an orphaned branch ends up at
    /// the zero digest.
    pub fn undo(&self) -> Result<()> {
        let current = self.current_commit()?;
        if current.is_zero() {
            return Err(Error::NoCommits);
        }

        let commit = self.store().get_commit(&current)?;
        let parent = commit.parents.first().copied().unwrap_or(Digest::ZERO);

        let branch = self.current_branch()?;
        self.set_ref(&format!("{}{}", HEADS_PREFIX, branch), &parent)
    }

    /// replace the tip commit, reusing its parent list
    ///
    /// an empty message reuses the tip's message. the old tip becomes
    /// unreferenced.
    pub fn amend(&self, paths: &[String], message: &str) -> Result<Digest> {
        let current = self.current_commit()?;
        if current.is_zero() {
            return Err(Error::NoCommits);
        }
        let old = self.store().get_commit(&current)?;

        let message = if message.is_empty() {
            old.message.clone()
        } else {
            message.to_string()
        };

        let files = if paths.is_empty() {
            self.list_all_files()?
        } else {
            paths.to_vec()
        };
        let tree = self.build_tree(&files)?;
        let tree_digest = self.store().put_tree(&tree)?;

        let commit = Commit {
            tree: tree_digest,
            parents: old.parents,
            author: author_name(),
            email: author_email(),
            timestamp: unix_now(),
            message,
        };
        let digest = self.store().put_commit(&commit)?;

        let branch = self.current_branch()?;
        self.set_ref(&format!("{}{}", HEADS_PREFIX, branch), &digest)?;
        Ok(digest)
    }

    /// write a commit's tree out to the working directory
    ///
    /// files absent from the tree are not removed.
    pub fn checkout(&self, commit: &Digest) -> Result<()> {
        let commit = self.store().get_commit(commit)?;
        let tree = self.store().get_tree(&commit.tree)?;

        for entry in &tree.entries {
            let obj = self.store().get(&entry.digest)?;
            if obj.kind != ObjectKind::Blob {
                continue;
            }

            let path = self.root().join(&entry.name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_path(parent)?;
            }
            fs::write(&path, &obj.data).with_path(&path)?;
            fs::set_permissions(&path, fs::Permissions::from_mode(entry.mode & 0o777))
                .with_path(&path)?;
        }

        Ok(())
    }

    /// read one file out of a commit's tree
    pub fn file_content(&self, commit: &Digest, name: &str) -> Result<Vec<u8>> {
        let commit = self.store().get_commit(commit)?;
        let tree = self.store().get_tree(&commit.tree)?;

        match tree.get(name) {
            Some(entry) => Ok(self.store().get(&entry.digest)?.data.clone()),
            None => Err(Error::FileNotFound(name.to_string())),
        }
    }

    /// flat change listing between two commits' trees
    ///
    /// either side may be the zero digest, meaning an empty tree.
    pub fn tree_diff(&self, old: &Digest, new: &Digest) -> Result<BTreeMap<String, ChangeKind>> {
        let old_files = self.commit_file_map(old)?;
        let new_files = self.commit_file_map(new)?;

        let mut changes = BTreeMap::new();
        for (name, old_digest) in &old_files {
            match new_files.get(name) {
                None => {
                    changes.insert(name.clone(), ChangeKind::Deleted);
                }
                Some(new_digest) if new_digest != old_digest => {
                    changes.insert(name.clone(), ChangeKind::Modified);
                }
                Some(_) => {}
            }
        }
        for name in new_files.keys() {
            if !old_files.contains_key(name) {
                changes.insert(name.clone(), ChangeKind::Added);
            }
        }
        Ok(changes)
    }

    /// `path → blob digest` map for a commit's tree (empty for zero digest)
    pub(crate) fn commit_file_map(&self, commit: &Digest) -> Result<BTreeMap<String, Digest>> {
        if commit.is_zero() {
            return Ok(BTreeMap::new());
        }
        let commit = self.store().get_commit(commit)?;
        let tree = self.store().get_tree(&commit.tree)?;
        Ok(tree
            .entries
            .into_iter()
            .map(|e| (e.name, e.digest))
            .collect())
    }

    /// all files under the working root, except repository metadata
    pub fn list_all_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(self.root())
            .into_iter()
            .filter_entry(|e| e.file_name() != META_DIR);

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                match e.into_io_error() {
                    Some(source) => Error::StorageFault { path, source },
                    None => Error::FileNotFound(path.display().to_string()),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(self.root()) {
                files.push(rel.to_string_lossy().to_string());
            }
        }

        Ok(files)
    }

    /// hash files in parallel and assemble a tree
    ///
    /// entries land in worker completion order; the encoding is not
    /// sorted by name, so the same file set can yield different tree
    /// digests across runs.
    pub(crate) fn build_tree(&self, files: &[String]) -> Result<Tree> {
        if files.is_empty() {
            return Ok(Tree::default());
        }

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(files.len());

        let (job_tx, job_rx) = bounded::<&str>(files.len());
        let (result_tx, result_rx) = bounded::<Result<TreeEntry>>(files.len());

        for file in files {
            let _ = job_tx.send(file.as_str());
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    while let Ok(path) = job_rx.recv() {
                        let _ = result_tx.send(self.hash_file(path));
                    }
                });
            }
            drop(result_tx);

            let mut entries = Vec::with_capacity(files.len());
            let mut first_err = None;
            while let Ok(result) = result_rx.recv() {
                match result {
                    Ok(entry) => entries.push(entry),
                    Err(e) if first_err.is_none() => first_err = Some(e),
                    Err(_) => {}
                }
            }

            match first_err {
                Some(e) => Err(e),
                None => Ok(Tree::new(entries)),
            }
        })
    }

    /// read, hash and store one file as a blob entry
    fn hash_file(&self, path: &str) -> Result<TreeEntry> {
        let abs = self.root().join(path);

        let data = fs::read(&abs).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_string())
            } else {
                Error::StorageFault { path: abs.clone(), source: e }
            }
        })?;

        let digest = self.store().put_blob(&data)?;

        let meta = fs::metadata(&abs).with_path(&abs)?;
        let mode = if meta.permissions().mode() & 0o111 != 0 {
            MODE_EXECUTABLE
        } else {
            MODE_REGULAR
        };

        Ok(TreeEntry {
            mode,
            name: path.to_string(),
            digest,
        })
    }
}

/// author name from ASL_AUTHOR_NAME, then USER, then a fallback
pub fn author_name() -> String {
    std::env::var("ASL_AUTHOR_NAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "Unknown".to_string())
}

/// author email from ASL_AUTHOR_EMAIL, then EMAIL, then a fallback
pub fn author_email() -> String {
    std::env::var("ASL_AUTHOR_EMAIL")
        .or_else(|_| std::env::var("EMAIL"))
        .unwrap_or_else(|_| "unknown@localhost".to_string())
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_save_single_file() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("hello.txt"), "world").unwrap();

        let digest = repo.save(&[], "first").unwrap();

        assert_eq!(repo.current_commit().unwrap(), digest);
        let commit = repo.store().get_commit(&digest).unwrap();
        assert_eq!(commit.message, "first");
        assert!(commit.is_root());

        let tree = repo.store().get_tree(&commit.tree).unwrap();
        assert_eq!(tree.entries.len(), 1);
        assert_eq!(tree.entries[0].name, "hello.txt");
        assert_eq!(tree.entries[0].mode, MODE_REGULAR);
    }

    #[test]
    fn test_save_links_parent() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("f"), "v1").unwrap();
        let c1 = repo.save(&[], "one").unwrap();

        fs::write(dir.path().join("f"), "v2").unwrap();
        let c2 = repo.save(&[], "two").unwrap();

        let commit = repo.store().get_commit(&c2).unwrap();
        assert_eq!(commit.parents, vec![c1]);
    }

    #[test]
    fn test_save_rejects_empty_message() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("f"), "x").unwrap();

        assert!(matches!(
            repo.save(&[], ""),
            Err(Error::InvalidCommit(_))
        ));
    }

    #[test]
    fn test_save_nothing_to_commit() {
        let (_dir, repo) = test_repo();
        assert!(matches!(repo.save(&[], "msg"), Err(Error::NothingToCommit)));
    }

    #[test]
    fn test_save_skips_metadata_dir() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("tracked"), "x").unwrap();

        let files = repo.list_all_files().unwrap();
        assert_eq!(files, vec!["tracked"]);
    }

    #[test]
    fn test_save_executable_mode() {
        let (dir, repo) = test_repo();
        let script = dir.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let digest = repo.save(&[], "exec").unwrap();
        let commit = repo.store().get_commit(&digest).unwrap();
        let tree = repo.store().get_tree(&commit.tree).unwrap();
        assert_eq!(tree.entries[0].mode, MODE_EXECUTABLE);
    }

    #[test]
    fn test_save_many_files_parallel() {
        let (dir, repo) = test_repo();
        for i in 0..32 {
            fs::write(dir.path().join(format!("f{}", i)), format!("content {}", i)).unwrap();
        }

        let digest = repo.save(&[], "bulk").unwrap();
        let commit = repo.store().get_commit(&digest).unwrap();
        let tree = repo.store().get_tree(&commit.tree).unwrap();
        assert_eq!(tree.entries.len(), 32);
    }

    #[test]
    fn test_save_missing_explicit_path() {
        let (_dir, repo) = test_repo();
        let result = repo.save(&["absent.txt".to_string()], "msg");
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_undo_moves_to_parent() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("f"), "v1").unwrap();
        let c1 = repo.save(&[], "one").unwrap();
        fs::write(dir.path().join("f"), "v2").unwrap();
        repo.save(&[], "two").unwrap();

        repo.undo().unwrap();
        assert_eq!(repo.current_commit().unwrap(), c1);

        // working tree untouched
        assert_eq!(fs::read_to_string(dir.path().join("f")).unwrap(), "v2");
    }

    #[test]
    fn test_undo_root_commit_orphans_branch() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("f"), "v1").unwrap();
        repo.save(&[], "one").unwrap();

        repo.undo().unwrap();
        assert!(repo.current_commit().unwrap().is_zero());
    }

    #[test]
    fn test_amend_replaces_tip() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("f"), "v1").unwrap();
        let c1 = repo.save(&[], "one").unwrap();
        fs::write(dir.path().join("f"), "v2").unwrap();
        let c2 = repo.save(&[], "two").unwrap();

        fs::write(dir.path().join("f"), "v2 fixed").unwrap();
        let c3 = repo.amend(&[], "two (amended)").unwrap();

        assert_ne!(c3, c2);
        let commit = repo.store().get_commit(&c3).unwrap();
        assert_eq!(commit.message, "two (amended)");
        // same parents as the commit it replaced
        assert_eq!(commit.parents, vec![c1]);
    }

    #[test]
    fn test_amend_reuses_message() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("f"), "v1").unwrap();
        repo.save(&[], "original message").unwrap();

        fs::write(dir.path().join("f"), "v1 fixed").unwrap();
        let amended = repo.amend(&[], "").unwrap();

        let commit = repo.store().get_commit(&amended).unwrap();
        assert_eq!(commit.message, "original message");
    }

    #[test]
    fn test_checkout_restores_files() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("f"), "v1").unwrap();
        let c1 = repo.save(&[], "one").unwrap();

        fs::write(dir.path().join("f"), "v2").unwrap();
        repo.save(&[], "two").unwrap();

        repo.checkout(&c1).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("f")).unwrap(), "v1");
    }

    #[test]
    fn test_checkout_does_not_remove_extra_files() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("keep"), "v1").unwrap();
        let c1 = repo.save(&[], "one").unwrap();

        fs::write(dir.path().join("extra"), "x").unwrap();
        repo.checkout(&c1).unwrap();
        assert!(dir.path().join("extra").exists());
    }

    #[test]
    fn test_file_content() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("a.txt"), "payload").unwrap();
        let c1 = repo.save(&[], "one").unwrap();

        assert_eq!(repo.file_content(&c1, "a.txt").unwrap(), b"payload");
        assert!(matches!(
            repo.file_content(&c1, "missing"),
            Err(Error::FileNotFound(_))
        ));
    }

    #[test]
    fn test_tree_diff() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("kept"), "same").unwrap();
        fs::write(dir.path().join("changed"), "v1").unwrap();
        fs::write(dir.path().join("removed"), "gone").unwrap();
        let c1 = repo.save(&[], "one").unwrap();

        fs::remove_file(dir.path().join("removed")).unwrap();
        fs::write(dir.path().join("changed"), "v2").unwrap();
        fs::write(dir.path().join("added"), "new").unwrap();
        let c2 = repo.save(&[], "two").unwrap();

        let changes = repo.tree_diff(&c1, &c2).unwrap();
        assert_eq!(changes.get("added"), Some(&ChangeKind::Added));
        assert_eq!(changes.get("changed"), Some(&ChangeKind::Modified));
        assert_eq!(changes.get("removed"), Some(&ChangeKind::Deleted));
        assert_eq!(changes.get("kept"), None);
    }

    #[test]
    fn test_tree_diff_against_zero() {
        let (dir, repo) = test_repo();
        fs::write(dir.path().join("f"), "x").unwrap();
        let c1 = repo.save(&[], "one").unwrap();

        let changes = repo.tree_diff(&Digest::ZERO, &c1).unwrap();
        assert_eq!(changes.get("f"), Some(&ChangeKind::Added));
    }
}
