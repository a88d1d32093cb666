//! Host-local advisory lock guarding `backup` operations: at most one
//! backup per subvolume runs on a given host at a time (§5).

use crate::error::Error;
use fs4::tokio::AsyncFileExt;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tracing::debug;

pub struct SubvolumeLock {
    file: File,
    path: PathBuf,
    released: bool,
}

impl SubvolumeLock {
    /// Attempts to acquire the lock immediately, failing rather than
    /// blocking — a second concurrent `backup` invocation for the same
    /// subvolume must fail fast (§8 scenario 6), not queue.
    pub async fn acquire(lock_dir: &Path, subvolume: &str) -> Result<Self, Error> {
        tokio::fs::create_dir_all(lock_dir).await?;
        let path = lock_dir.join(format!("{}.lock", hex::encode(subvolume.as_bytes())));
        let file = OpenOptions::new().create(true).write(true).open(&path).await?;

        file.try_lock_exclusive().map_err(|e| Error::LockHeld {
            subvolume: subvolume.to_string(),
            reason: e.to_string(),
        })?;

        debug!(subvolume, path = %path.display(), "acquired host-local lock");
        Ok(SubvolumeLock { file, path, released: false })
    }

    pub fn release(mut self) -> Result<(), Error> {
        self.released = true;
        self.file.unlock().map_err(|e| Error::LockHeld {
            subvolume: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl Drop for SubvolumeLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.file.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_lock_on_same_subvolume_fails_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let first = SubvolumeLock::acquire(dir.path(), "tank/data").await.unwrap();
        let second = SubvolumeLock::acquire(dir.path(), "tank/data").await;
        assert!(second.is_err());
        first.release().unwrap();
    }

    #[tokio::test]
    async fn lock_is_released_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _first = SubvolumeLock::acquire(dir.path(), "tank/data").await.unwrap();
        }
        let second = SubvolumeLock::acquire(dir.path(), "tank/data").await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn distinct_subvolumes_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let a = SubvolumeLock::acquire(dir.path(), "tank/a").await.unwrap();
        let b = SubvolumeLock::acquire(dir.path(), "tank/b").await.unwrap();
        a.release().unwrap();
        b.release().unwrap();
    }
}
