//! Process-scoped advisory lock table for a lock-capable tier.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use crate::error::FsError;
use crate::model::{FileLock, LockType};

/// Path-keyed lock records with shared-read coalescing.
///
/// At most one record exists per path. A read-lock acquire against an
/// existing read lock succeeds without creating anything, so the coalesced
/// acquirer owns nothing: only the process that created the record may
/// release it. Records have no timeout and are never garbage collected.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: RwLock<HashMap<String, FileLock>>,
}

impl LockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a lock on `path` for `pid`.
    ///
    /// Read locks coalesce; any other combination against an existing record
    /// fails with [`FsError::Busy`].
    pub fn acquire(&self, path: &str, lock_type: LockType, pid: u32) -> Result<(), FsError> {
        let mut locks = self
            .locks
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = locks.get(path) {
            if existing.lock_type == LockType::Read && lock_type == LockType::Read {
                return Ok(());
            }
            return Err(FsError::Busy);
        }

        locks.insert(
            path.to_owned(),
            FileLock {
                lock_type,
                pid,
                created_at: SystemTime::now(),
            },
        );
        Ok(())
    }

    /// Release the lock on `path`, which must be owned by `pid`.
    pub fn release(&self, path: &str, pid: u32) -> Result<(), FsError> {
        let mut locks = self
            .locks
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(record) = locks.get(path) else {
            return Err(FsError::NotLocked);
        };
        if record.pid != pid {
            return Err(FsError::NotOwner);
        }
        locks.remove(path);
        Ok(())
    }

    /// Current record for `path`, if any.
    #[must_use]
    pub fn query(&self, path: &str) -> Option<FileLock> {
        self.locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
    }
}
