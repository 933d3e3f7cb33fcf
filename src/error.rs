use std::path::PathBuf;

use crate::Digest;

/// error type for asl operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not an asl repository (searched up from {0})")]
    NotARepository(PathBuf),

    #[error("already an asl repository at {0}")]
    AlreadyRepository(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("object not found: {0}")]
    ObjectNotFound(Digest),

    #[error("invalid object format: {0}")]
    InvalidObject(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("expected {expected} object, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("branch already exists: {0}")]
    BranchExists(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("no commits yet")]
    NoCommits,

    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("working directory has uncommitted changes")]
    DirtyWorkingDir,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("HEAD is detached")]
    DetachedHead,

    #[error("merge already in progress")]
    MergeInProgress,

    #[error("no merge in progress")]
    NoMergeInProgress,

    #[error("unresolved conflicts remain")]
    ConflictsExist,

    #[error("no common ancestor")]
    NoCommonAncestor,

    #[error("cannot fast-forward")]
    CannotFastForward,

    #[error("storage fault at {path}: {source}")]
    StorageFault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transport fault: {message}")]
    TransportFault {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
}

impl Error {
    /// wrap an error as a transport fault, keeping the cause chain
    pub fn transport(message: impl Into<String>, source: Error) -> Self {
        Error::TransportFault {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// transport fault with no underlying cause
    pub fn transport_msg(message: impl Into<String>) -> Self {
        Error::TransportFault {
            message: message.into(),
            source: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::StorageFault {
            path: path.into(),
            source,
        })
    }
}
