//! persisted state of an in-progress conflicted merge
//!
//! serialized as JSON at `.asl/MERGE_STATE`, written atomically so a
//! partial failure leaves either the old state or none, never a
//! truncated file. the record exists only between a conflicted merge
//! and its `continue` or `abort`.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::fsutil::atomic_write;
use crate::repo::Repository;

const STATE_FILE: &str = "MERGE_STATE";

/// conflict classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    Content,
    DeleteModify,
    ModifyDelete,
    AddAdd,
    Binary,
}

/// one conflicted path and whether it has been resolved
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub resolved: bool,
}

/// record of an in-progress merge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeState {
    /// the incoming branch being merged
    pub branch: String,
    pub base_commit: Digest,
    pub our_commit: Digest,
    pub their_commit: Digest,
    pub strategy: String,
    pub conflicts: Vec<ConflictInfo>,
    pub resolved: Vec<String>,
    pub auto_merged: Vec<String>,
}

impl MergeState {
    /// fail unless every conflict has been resolved
    pub fn validate_resolved(&self) -> Result<()> {
        if self.has_unresolved() {
            return Err(Error::ConflictsExist);
        }
        Ok(())
    }

    pub fn has_unresolved(&self) -> bool {
        self.conflicts.iter().any(|c| !c.resolved)
    }

    /// flip a conflict's resolved flag and record the path
    pub fn mark_resolved(&mut self, path: &str) -> Result<()> {
        let mut found = false;
        for conflict in &mut self.conflicts {
            if conflict.path == path {
                conflict.resolved = true;
                found = true;
            }
        }
        if !found {
            return Err(Error::FileNotFound(path.to_string()));
        }

        if !self.resolved.iter().any(|p| p == path) {
            self.resolved.push(path.to_string());
        }
        Ok(())
    }
}

fn state_path(repo: &Repository) -> PathBuf {
    repo.meta_path().join(STATE_FILE)
}

/// persist merge state atomically
pub fn save_state(repo: &Repository, state: &MergeState) -> Result<()> {
    let data = serde_json::to_vec_pretty(state)
        .map_err(|e| Error::InvalidObject(format!("merge state encode: {}", e)))?;
    atomic_write(&state_path(repo), &data)
}

/// load merge state, failing when no merge is in progress
pub fn load_state(repo: &Repository) -> Result<MergeState> {
    let path = state_path(repo);
    let data = fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NoMergeInProgress
        } else {
            Error::StorageFault { path: path.clone(), source: e }
        }
    })?;

    serde_json::from_slice(&data)
        .map_err(|e| Error::InvalidObject(format!("merge state decode: {}", e)))
}

/// remove merge state; absent state is not an error
pub fn clear_state(repo: &Repository) -> Result<()> {
    let path = state_path(repo);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::StorageFault { path, source: e }),
    }
}

/// true while a conflicted merge awaits continue or abort
pub fn in_progress(repo: &Repository) -> bool {
    state_path(repo).exists()
}
