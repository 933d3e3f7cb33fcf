//! three-way merge engine
//!
//! merging walks the union of paths across the base, our and their
//! trees, classifies each path by presence and content equality, and
//! either fast-forwards, writes a two-parent merge commit, or persists
//! a conflict state to be finished later with `continue` or `abort`.

pub mod content;
pub mod state;

use std::collections::BTreeSet;
use std::fs;

use tracing::debug;

pub use content::{conflict_block, is_binary, three_way, ContentMerge, LineConflict};
pub use state::{
    clear_state, in_progress, load_state, save_state, ConflictInfo, ConflictKind, MergeState,
};

use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::history;
use crate::object::Commit;
use crate::refs::HEADS_PREFIX;
use crate::repo::Repository;
use crate::snapshot::{author_email, author_name, unix_now};

/// per-file resolution strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Recursive,
    Ours,
    Theirs,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Recursive => "recursive",
            Strategy::Ours => "ours",
            Strategy::Theirs => "theirs",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "recursive" => Ok(Strategy::Recursive),
            "ours" => Ok(Strategy::Ours),
            "theirs" => Ok(Strategy::Theirs),
            other => Err(Error::InvalidConfig(format!("unknown merge strategy: {}", other))),
        }
    }
}

/// merge options
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeOptions {
    /// force a merge commit even when fast-forward applies
    pub no_ff: bool,
    /// fail unless fast-forward applies
    pub ff_only: bool,
    pub strategy: Strategy,
}

/// what a merge did
#[derive(Clone, Debug)]
pub struct MergeOutcome {
    pub fast_forward: bool,
    pub conflicts: bool,
    pub merge_commit: Option<Digest>,
    pub message: String,
    pub auto_merged: Vec<String>,
    pub conflicted: Vec<String>,
}

impl Repository {
    /// merge the named branch into the current branch
    pub fn merge(&self, branch: &str, opts: &MergeOptions) -> Result<MergeOutcome> {
        if state::in_progress(self) {
            return Err(Error::MergeInProgress);
        }

        let their_commit = self.get_ref(&format!("{}{}", HEADS_PREFIX, branch))?;
        let our_commit = self.current_commit()?;

        let base = history::find_lca(self.store(), &our_commit, &their_commit)?;

        let can_ff = history::can_fast_forward(self.store(), &our_commit, &their_commit);
        if opts.ff_only && !can_ff {
            return Err(Error::CannotFastForward);
        }
        if can_ff && !opts.no_ff {
            return self.fast_forward(&their_commit, branch);
        }

        self.three_way_merge(&base, &our_commit, &their_commit, branch, opts)
    }

    /// advance the current branch to `target` without a merge commit
    fn fast_forward(&self, target: &Digest, branch: &str) -> Result<MergeOutcome> {
        let current = self.current_branch()?;
        self.set_ref(&format!("{}{}", HEADS_PREFIX, current), target)?;
        self.checkout(target)?;

        debug!(%target, from = branch, "fast-forward");
        Ok(MergeOutcome {
            fast_forward: true,
            conflicts: false,
            merge_commit: Some(*target),
            message: format!("Fast-forward to {}", branch),
            auto_merged: vec![],
            conflicted: vec![],
        })
    }

    fn three_way_merge(
        &self,
        base: &Digest,
        ours: &Digest,
        theirs: &Digest,
        their_branch: &str,
        opts: &MergeOptions,
    ) -> Result<MergeOutcome> {
        let base_files = self.commit_file_map(base)?;
        let our_files = self.commit_file_map(ours)?;
        let their_files = self.commit_file_map(theirs)?;

        let all_paths: BTreeSet<&String> = base_files
            .keys()
            .chain(our_files.keys())
            .chain(their_files.keys())
            .collect();

        let mut merged_files = Vec::new();
        let mut auto_merged = Vec::new();
        let mut conflicts = Vec::new();
        // conflict-marker content to land in the working tree, per path
        let mut conflict_payloads: Vec<(String, Vec<u8>)> = Vec::new();

        for path in all_paths {
            let base_blob = base_files.get(path);
            let our_blob = our_files.get(path);
            let their_blob = their_files.get(path);

            match (base_blob, our_blob, their_blob) {
                // added on one side only
                (None, Some(o), None) => {
                    merged_files.push((path.clone(), *o));
                    auto_merged.push(path.clone());
                }
                (None, None, Some(t)) => {
                    merged_files.push((path.clone(), *t));
                    auto_merged.push(path.clone());
                }

                // added on both sides
                (None, Some(o), Some(t)) => {
                    if o == t {
                        merged_files.push((path.clone(), *o));
                        auto_merged.push(path.clone());
                    } else {
                        conflicts.push(ConflictInfo {
                            path: path.clone(),
                            kind: ConflictKind::AddAdd,
                            resolved: false,
                        });
                        let ours_text = String::from_utf8_lossy(&self.store().get(o)?.data)
                            .into_owned();
                        let theirs_text = String::from_utf8_lossy(&self.store().get(t)?.data)
                            .into_owned();
                        conflict_payloads.push((
                            path.clone(),
                            conflict_block(&ours_text, "", &theirs_text, their_branch).into_bytes(),
                        ));
                    }
                }

                // deleted on both sides
                (Some(_), None, None) => {}

                // they deleted
                (Some(b), Some(o), None) => {
                    if b == o {
                        // we kept it unchanged, accept the deletion
                    } else {
                        conflicts.push(ConflictInfo {
                            path: path.clone(),
                            kind: ConflictKind::ModifyDelete,
                            resolved: false,
                        });
                        // leave our modified content in the working tree
                        conflict_payloads.push((path.clone(), self.store().get(o)?.data.clone()));
                    }
                }

                // we deleted
                (Some(b), None, Some(t)) => {
                    if b == t {
                        // they kept it unchanged, accept the deletion
                    } else {
                        conflicts.push(ConflictInfo {
                            path: path.clone(),
                            kind: ConflictKind::DeleteModify,
                            resolved: false,
                        });
                        // surface their modified content in the working tree
                        conflict_payloads.push((path.clone(), self.store().get(t)?.data.clone()));
                    }
                }

                // present everywhere
                (Some(b), Some(o), Some(t)) => {
                    if o == t {
                        merged_files.push((path.clone(), *o));
                        auto_merged.push(path.clone());
                    } else if b == o {
                        merged_files.push((path.clone(), *t));
                        auto_merged.push(path.clone());
                    } else if b == t {
                        merged_files.push((path.clone(), *o));
                        auto_merged.push(path.clone());
                    } else {
                        // both changed it: strategy short-circuit or content merge
                        match opts.strategy {
                            Strategy::Ours => {
                                merged_files.push((path.clone(), *o));
                                auto_merged.push(path.clone());
                            }
                            Strategy::Theirs => {
                                merged_files.push((path.clone(), *t));
                                auto_merged.push(path.clone());
                            }
                            Strategy::Recursive => {
                                let base_data = self.store().get(b)?.data.clone();
                                let our_data = self.store().get(o)?.data.clone();
                                let their_data = self.store().get(t)?.data.clone();

                                let result = three_way(
                                    &base_data,
                                    &our_data,
                                    &their_data,
                                    path,
                                    their_branch,
                                );

                                if result.has_conflict {
                                    let kind = result
                                        .conflicts
                                        .first()
                                        .map(|c| c.kind)
                                        .unwrap_or(ConflictKind::Content);
                                    conflicts.push(ConflictInfo {
                                        path: path.clone(),
                                        kind,
                                        resolved: false,
                                    });
                                    conflict_payloads
                                        .push((path.clone(), result.content.into_bytes()));
                                } else {
                                    let digest = self.store().put_blob(result.content.as_bytes())?;
                                    merged_files.push((path.clone(), digest));
                                    auto_merged.push(path.clone());
                                }
                            }
                        }
                    }
                }

                (None, None, None) => unreachable!("path came from the union of the three maps"),
            }
        }

        if !conflicts.is_empty() {
            let merge_state = MergeState {
                branch: their_branch.to_string(),
                base_commit: *base,
                our_commit: *ours,
                their_commit: *theirs,
                strategy: opts.strategy.as_str().to_string(),
                conflicts: conflicts.clone(),
                resolved: vec![],
                auto_merged: auto_merged.clone(),
            };
            save_state(self, &merge_state)?;

            // overwrite conflicted working tree files with marker content
            for (path, payload) in &conflict_payloads {
                let abs = self.root().join(path);
                if let Some(parent) = abs.parent() {
                    fs::create_dir_all(parent).with_path(parent)?;
                }
                fs::write(&abs, payload).with_path(&abs)?;
            }

            let conflicted: Vec<String> = conflicts.into_iter().map(|c| c.path).collect();
            debug!(count = conflicted.len(), branch = their_branch, "merge has conflicts");
            return Ok(MergeOutcome {
                fast_forward: false,
                conflicts: true,
                merge_commit: None,
                message: format!("Merge has conflicts in {} file(s)", conflicted.len()),
                auto_merged,
                conflicted,
            });
        }

        let merge_commit =
            self.write_merge_commit(their_branch, ours, theirs, merged_files)?;
        self.checkout(&merge_commit)?;

        Ok(MergeOutcome {
            fast_forward: false,
            conflicts: false,
            merge_commit: Some(merge_commit),
            message: format!("Merged {} into current branch", their_branch),
            auto_merged,
            conflicted: vec![],
        })
    }

    /// assemble a tree from merged paths and commit it with two parents
    fn write_merge_commit(
        &self,
        their_branch: &str,
        ours: &Digest,
        theirs: &Digest,
        files: Vec<(String, Digest)>,
    ) -> Result<Digest> {
        let entries = files
            .into_iter()
            .map(|(name, digest)| crate::object::TreeEntry {
                mode: crate::snapshot::MODE_REGULAR,
                name,
                digest,
            })
            .collect();
        let tree = crate::object::Tree::new(entries);
        let tree_digest = self.store().put_tree(&tree)?;

        let commit = Commit {
            tree: tree_digest,
            parents: vec![*ours, *theirs],
            author: author_name(),
            email: author_email(),
            timestamp: unix_now(),
            message: format!("Merge branch '{}'", their_branch),
        };
        let digest = self.store().put_commit(&commit)?;

        let branch = self.current_branch()?;
        self.set_ref(&format!("{}{}", HEADS_PREFIX, branch), &digest)?;
        Ok(digest)
    }

    /// finish a conflicted merge after every conflict has been resolved
    ///
    /// rebuilds the tree from the working directory and writes a commit
    /// with parents `[our_commit, their_commit]`.
    pub fn continue_merge(&self) -> Result<Digest> {
        let merge_state = load_state(self)?;
        merge_state.validate_resolved()?;

        let files = self.list_all_files()?;
        let tree = self.build_tree(&files)?;
        let tree_digest = self.store().put_tree(&tree)?;

        let commit = Commit {
            tree: tree_digest,
            parents: vec![merge_state.our_commit, merge_state.their_commit],
            author: author_name(),
            email: author_email(),
            timestamp: unix_now(),
            message: format!("Merge branch '{}'", merge_state.branch),
        };
        let digest = self.store().put_commit(&commit)?;

        let branch = self.current_branch()?;
        self.set_ref(&format!("{}{}", HEADS_PREFIX, branch), &digest)?;

        clear_state(self)?;
        Ok(digest)
    }

    /// abandon a conflicted merge, restoring our pre-merge tree
    pub fn abort_merge(&self) -> Result<()> {
        let merge_state = load_state(self)?;
        self.checkout(&merge_state.our_commit)?;
        clear_state(self)
    }

    /// mark one conflicted path as resolved
    pub fn resolve(&self, path: &str) -> Result<()> {
        let mut merge_state = load_state(self)?;
        merge_state.mark_resolved(path)?;
        save_state(self, &merge_state)
    }
}
