//! small filesystem helpers shared by refs, merge state and the store

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::{IoResultExt, Result};

/// atomic file replace: write a temp file in the target directory,
/// fsync, then rename over the destination
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_path(parent)?;

    let tmp = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    {
        let mut file = File::create(&tmp).with_path(&tmp)?;
        file.write_all(data).with_path(&tmp)?;
        file.sync_all().with_path(&tmp)?;
    }

    fs::rename(&tmp, path).with_path(path)?;
    fsync_dir(parent)?;
    Ok(())
}

/// fsync a directory so a rename survives a crash
pub(crate) fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path).with_path(path)?;
    dir.sync_all().with_path(path)?;
    Ok(())
}
