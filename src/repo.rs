use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::store::Store;

/// repository metadata directory name
pub const META_DIR: &str = ".asl";

const DEFAULT_CONFIG: &str = "[core]\n\trepositoryformatversion = 1\n";

/// an asl repository: a working directory with a `.asl/` metadata
/// directory holding the object store, refs and configuration
pub struct Repository {
    root: PathBuf,
    store: Store,
}

impl Repository {
    /// initialize a new repository in the given directory
    pub fn init(path: &Path) -> Result<Self> {
        let meta = path.join(META_DIR);
        if meta.exists() {
            return Err(Error::AlreadyRepository(path.to_path_buf()));
        }

        for dir in [
            meta.clone(),
            meta.join("objects"),
            meta.join("refs/heads"),
            meta.join("config"),
        ] {
            fs::create_dir_all(&dir).with_path(&dir)?;
        }

        // HEAD starts symbolic, pointing at the unborn main branch
        let head = meta.join("HEAD");
        fs::write(&head, "ref: refs/heads/main\n").with_path(&head)?;

        let config = meta.join("config/config");
        fs::write(&config, DEFAULT_CONFIG).with_path(&config)?;

        Self::open(path)
    }

    /// open an existing repository
    pub fn open(path: &Path) -> Result<Self> {
        let meta = path.join(META_DIR);
        if !meta.exists() {
            return Err(Error::NotARepository(path.to_path_buf()));
        }

        Ok(Self {
            root: path.to_path_buf(),
            store: Store::new(meta),
        })
    }

    /// find the repository root by walking up from a starting path
    pub fn find_root(start: &Path) -> Result<PathBuf> {
        let mut path = start
            .canonicalize()
            .with_path(start)?;

        loop {
            if path.join(META_DIR).exists() {
                return Ok(path);
            }
            if !path.pop() {
                return Err(Error::NotARepository(start.to_path_buf()));
            }
        }
    }

    /// open the repository containing the given path
    pub fn discover(start: &Path) -> Result<Self> {
        let root = Self::find_root(start)?;
        Self::open(&root)
    }

    /// working directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// the `.asl` metadata directory
    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    /// the object store
    pub fn store(&self) -> &Store {
        &self.store
    }
}
