// src/storage/lock.rs
use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("could not open the lock file \"{path}\": {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("could not lock \"{path}\": {source}")]
    Lock { path: PathBuf, source: io::Error },
    #[error("timed out after {timeout:?} waiting for \"{path}\"")]
    Timeout { path: PathBuf, timeout: Duration },
}

/// Exclusive advisory lock on a companion file, released on drop.
///
/// The lock file itself is left on disk.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Polls until the lock is held or `timeout` runs out.
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| LockError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(TryLockError::WouldBlock) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LockError::Timeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    sleep(POLL_INTERVAL.min(deadline - now)).await;
                }
                Err(TryLockError::Error(source)) => {
                    return Err(LockError::Lock {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well.
        let _ = self.file.unlock();
    }
}
