use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use crate::error::{CoreError, CoreResult};

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive advisory lock backed by a lock file, released on drop.
///
/// Publishing, garbage collection and validation of the same docroots must
/// not run concurrently; every such command holds this lock.
#[derive(Debug)]
pub struct Lock {
    path: PathBuf,
    file: File,
}

impl Lock {
    /// Creates the lock file, retrying for up to `wait` while another process
    /// holds it.
    pub fn acquire(path: impl Into<PathBuf>, wait: Duration) -> CoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(CoreError::io(parent))?;
        }

        let deadline = Instant::now() + wait;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    // dropping the lock on a failed write removes the file again
                    let mut lock = Self { path, file };
                    writeln!(lock.file, "{}", std::process::id())
                        .map_err(CoreError::io(&lock.path))?;
                    tracing::debug!("acquired lock {}", lock.path.display());
                    return Ok(lock);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(CoreError::Locked(path));
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(source) => return Err(CoreError::Io { path, source }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::error!("failed to release lock {}: {e}", self.path.display());
        }
    }
}
