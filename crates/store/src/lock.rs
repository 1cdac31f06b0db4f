use std::{
    fs::{
        File,
        OpenOptions,
    },
    path::{
        Path,
        PathBuf,
    },
};

use fs2::FileExt;

use crate::error::{
    Error,
    Result,
};

/// Held advisory lock on a directory file. The OS releases the lock when
/// the handle is dropped, which also covers process crashes.
pub struct DirectoryLock {
    path: PathBuf,
    _file: File,
}

impl DirectoryLock {
    pub(crate) fn obtain(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        file.try_lock_exclusive()
            .map_err(|_| Error::LockObtainFailed(path.display().to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        tracing::debug!("releasing lock {}", self.path.display());
    }
}
