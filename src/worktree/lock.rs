use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::errors::WorkspaceError;

/// How long a mutating command waits for another one on the same feature.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive advisory lock for one feature, held while worktrees are mutated.
///
/// The lock file sits next to the feature directory as `.<feature>.lock` so
/// the directory itself can be deleted while the lock is held. Dropping the
/// guard releases the lock; [`delete_file`](Self::delete_file) also removes
/// the file once the feature is gone.
#[derive(Debug)]
pub struct FeatureLock {
    file: File,
    path: PathBuf,
}

impl FeatureLock {
    pub fn path_for(worktree_root: &Path, feature: &str) -> PathBuf {
        worktree_root.join(format!(".{feature}.lock"))
    }

    /// Acquire the lock, retrying until `timeout` elapses.
    pub fn acquire(
        worktree_root: &Path,
        feature: &str,
        timeout: Duration,
    ) -> Result<Self, WorkspaceError> {
        fs::create_dir_all(worktree_root).map_err(|e| WorkspaceError::io(worktree_root, e))?;
        let path = Self::path_for(worktree_root, feature);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| WorkspaceError::io(&path, e))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(feature, lock = %path.display(), "acquired feature lock");
                    return Ok(Self { file, path });
                }
                Err(_) if started.elapsed() < timeout => thread::sleep(RETRY_INTERVAL),
                Err(_) => {
                    return Err(WorkspaceError::ConcurrentOperation {
                        feature: feature.to_string(),
                        waited: timeout,
                    });
                }
            }
        }
    }

    /// Unlink the lock file while still holding the lock. Called after the
    /// feature directory is deleted.
    pub fn delete_file(&self) -> Result<(), WorkspaceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(lock = %self.path.display(), "deleted feature lock file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::io(&self.path, e)),
        }
    }
}

impl Drop for FeatureLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(lock = %self.path.display(), "released feature lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_times_out() {
        let dir = tempdir().unwrap();
        let _held = FeatureLock::acquire(dir.path(), "auth", DEFAULT_LOCK_TIMEOUT).unwrap();

        let err = FeatureLock::acquire(dir.path(), "auth", Duration::from_millis(200)).unwrap_err();
        assert!(matches!(
            err,
            WorkspaceError::ConcurrentOperation { ref feature, .. } if feature == "auth"
        ));
    }

    #[test]
    fn test_released_on_drop() {
        let dir = tempdir().unwrap();
        {
            let _held = FeatureLock::acquire(dir.path(), "auth", DEFAULT_LOCK_TIMEOUT).unwrap();
        }
        FeatureLock::acquire(dir.path(), "auth", Duration::from_millis(200)).unwrap();
    }

    #[test]
    fn test_different_features_do_not_contend() {
        let dir = tempdir().unwrap();
        let _auth = FeatureLock::acquire(dir.path(), "auth", DEFAULT_LOCK_TIMEOUT).unwrap();
        FeatureLock::acquire(dir.path(), "billing", Duration::from_millis(200)).unwrap();
        assert!(FeatureLock::path_for(dir.path(), "auth").exists());
    }

    #[test]
    fn test_delete_file_while_held() {
        let dir = tempdir().unwrap();
        let held = FeatureLock::acquire(dir.path(), "auth", DEFAULT_LOCK_TIMEOUT).unwrap();
        held.delete_file().unwrap();
        assert!(!FeatureLock::path_for(dir.path(), "auth").exists());
        // Already gone is fine.
        held.delete_file().unwrap();
        drop(held);

        FeatureLock::acquire(dir.path(), "auth", Duration::from_millis(200)).unwrap();
    }
}
