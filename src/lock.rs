use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::FileExt;

use crate::error::RunError;

/// Exclusive lock held for the duration of a sync run.
///
/// The index file has a single writer; a second run against the same index
/// fails fast instead of waiting.
pub struct RunLock {
    file: File,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self, RunError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        if file.try_lock_exclusive().is_err() {
            return Err(RunError::Locked(path.to_path_buf()));
        }
        Ok(Self { file })
    }
}

/// Lock file guarding an index: `<index>.lock` next to it.
pub fn lock_path_for(index_path: &Path) -> PathBuf {
    let mut name = index_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
