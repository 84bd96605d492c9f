//! store::lock
//!
//! Exclusive cross-process lock for a persisted store file.
//!
//! # Architecture
//!
//! The store assumes a single logical editor session per persisted file.
//! Within one process that is enforced by the working-set protocol; across
//! processes it is enforced here, with an OS-level exclusive lock on a
//! sibling `<file>.lock` file. Opening a store acquires the lock and holds
//! it for the store's lifetime.
//!
//! # Invariants
//!
//! - Lock acquisition is non-blocking (fails fast if locked)
//! - Lock is automatically released on drop (RAII pattern)
//! - Readers need no lock: committed frames and snapshots are immutable

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process already holds the lock.
    #[error("store file is locked by another process")]
    AlreadyLocked,

    /// Failed to create the lock file or its directory.
    #[error("failed to create lock: {0}")]
    CreateFailed(String),

    /// Failed to acquire the OS lock.
    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// An exclusive lock guarding a persisted store file.
///
/// The lock is released when this guard is dropped, even if the owning
/// operation panics.
///
/// # Example
///
/// ```
/// use strata::store::StoreLock;
/// # use std::path::Path;
/// # let dir = tempfile::TempDir::new().unwrap();
/// # let store_path = dir.path().join("model.strata");
///
/// let lock = StoreLock::acquire(&store_path).unwrap();
/// assert!(lock.is_held());
///
/// // A second acquire fails while the first guard lives
/// assert!(StoreLock::acquire(&store_path).is_err());
/// ```
#[derive(Debug)]
pub struct StoreLock {
    /// Path to the lock file.
    path: PathBuf,
    /// The open file handle with the lock held.
    /// When this is Some, we hold the lock.
    file: Option<File>,
}

impl StoreLock {
    /// Attempt to acquire the lock for a store file.
    ///
    /// This uses OS-level file locking via `fs2`, which works across
    /// processes. The lock is non-blocking: if another process holds it,
    /// this returns [`LockError::AlreadyLocked`] immediately.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if another process holds the lock
    /// - [`LockError::CreateFailed`] if the lock file cannot be created
    /// - [`LockError::AcquireFailed`] if the OS lock cannot be acquired
    pub fn acquire(store_path: &Path) -> Result<Self, LockError> {
        let path = Self::lock_path(store_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    LockError::CreateFailed(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// The lock file path for a store file (`<file>.lock`).
    pub fn lock_path(store_path: &Path) -> PathBuf {
        let mut name = store_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| std::ffi::OsString::from("store"));
        name.push(".lock");
        store_path.with_file_name(name)
    }

    /// Check if the lock is currently held by this guard.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    ///
    /// This is called automatically on drop, but can be called early if the
    /// guard must outlive the critical section.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Best-effort release on drop - ignore errors since we're dropping
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_path(temp: &TempDir) -> PathBuf {
        temp.path().join("model.strata")
    }

    #[test]
    fn acquire_succeeds() {
        let temp = TempDir::new().expect("create temp dir");
        let lock = StoreLock::acquire(&store_path(&temp)).expect("acquire lock");
        assert!(lock.is_held());
        assert!(lock.path().exists());
    }

    #[test]
    fn lock_path_is_sibling_with_lock_suffix() {
        let path = Path::new("/models/water.strata");
        assert_eq!(
            StoreLock::lock_path(path),
            PathBuf::from("/models/water.strata.lock")
        );
    }

    #[test]
    fn second_acquire_fails() {
        let temp = TempDir::new().expect("create temp dir");
        let path = store_path(&temp);

        let lock1 = StoreLock::acquire(&path).expect("first acquire");
        assert!(lock1.is_held());

        let result = StoreLock::acquire(&path);
        assert!(matches!(result, Err(LockError::AlreadyLocked)));
    }

    #[test]
    fn released_on_drop() {
        let temp = TempDir::new().expect("create temp dir");
        let path = store_path(&temp);

        {
            let lock = StoreLock::acquire(&path).expect("first acquire");
            assert!(lock.is_held());
        }

        let lock2 = StoreLock::acquire(&path).expect("second acquire");
        assert!(lock2.is_held());
    }

    #[test]
    fn released_explicitly() {
        let temp = TempDir::new().expect("create temp dir");
        let path = store_path(&temp);

        let mut lock = StoreLock::acquire(&path).expect("acquire");
        lock.release().expect("release");
        assert!(!lock.is_held());

        let lock2 = StoreLock::acquire(&path).expect("reacquire");
        assert!(lock2.is_held());
    }

    #[test]
    fn multiple_release_calls_are_safe() {
        let temp = TempDir::new().expect("create temp dir");
        let mut lock = StoreLock::acquire(&store_path(&temp)).expect("acquire");

        lock.release().expect("first release");
        lock.release().expect("second release should be ok");
        assert!(!lock.is_held());
    }

    #[test]
    fn creates_missing_parent_directory() {
        let temp = TempDir::new().expect("create temp dir");
        let nested = temp.path().join("a").join("b").join("model.strata");

        let lock = StoreLock::acquire(&nested).expect("acquire");
        assert!(lock.is_held());
    }

    #[test]
    fn error_display_formatting() {
        let err = LockError::AlreadyLocked;
        assert!(err.to_string().contains("locked"));

        let err = LockError::CreateFailed("test".into());
        assert!(err.to_string().contains("create"));

        let err = LockError::AcquireFailed("test".into());
        assert!(err.to_string().contains("acquire"));

        let err = LockError::ReleaseFailed("test".into());
        assert!(err.to_string().contains("release"));
    }
}
