//! Advisory lock serializing agent operations on a host.
//!
//! The upgrade loop reads and mutates package state across several external
//! calls, so two overlapping invocations must never interleave. The lock is an
//! exclusive `flock` held until the guard is dropped.

use crate::errors::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Held exclusive lock; released on drop
#[derive(Debug)]
pub struct OperationLock {
    file: File,
    path: PathBuf,
}

impl OperationLock {
    /// Blocks until the lock at `path` is acquired.
    pub async fn acquire(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let file = open_lock_file(&path)?;
            file.lock_exclusive().map_err(|e| lock_error(&path, &e))?;
            debug!("Acquired operation lock {:?}", path);
            Ok(Self { file, path })
        })
        .await
        .map_err(|e| Error::Lock {
            path: String::new(),
            message: e.to_string(),
        })?
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| lock_error(path, &e))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| lock_error(path, &e))
}

fn lock_error(path: &Path, err: &std::io::Error) -> Error {
    Error::Lock {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
