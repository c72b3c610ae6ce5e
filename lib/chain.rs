//! Chain-of-responsibility engine over an ordered set of tiers.
//!
//! Reads walk the chain front to back and back-propagate hits into faster
//! tiers; writes and deletes fan out to every capable tier. Locking is
//! delegated to the first lock-capable tier, which configuration validation
//! guarantees is tier zero when present.

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::FsError;
use crate::model::{FileInfo, FileLock, LockType, TierFeatures};
use crate::tier::Tier;

/// Mode applied when a read back-propagates into lower tiers.
const PROPAGATED_MODE: u32 = 0o644;

/// The chained filesystem engine.
///
/// The guard linearizes same-path reads against writes: `info`/`list`/`read`
/// take it shared, `write`/`delete` exclusive, and it stays held across tier
/// I/O so back-propagation cannot interleave with a concurrent writer.
pub struct Chain {
    tiers: Vec<Box<dyn Tier>>,
    guard: RwLock<()>,
}

impl Chain {
    #[must_use]
    pub fn new(tiers: Vec<Box<dyn Tier>>) -> Self {
        Self {
            tiers,
            guard: RwLock::new(()),
        }
    }

    fn lock_tier(&self) -> Option<&dyn Tier> {
        self.tiers
            .iter()
            .find(|t| t.features().can_lock)
            .map(|tier| &**tier)
    }

    async fn lock_state(&self, path: &str) -> Result<Option<FileLock>, FsError> {
        match self.lock_tier() {
            Some(tier) => tier.lock_state(path).await,
            None => Ok(None),
        }
    }

    /// First-hit metadata lookup; the last tier's error wins a full miss.
    pub async fn info(&self, path: &str) -> Result<FileInfo, FsError> {
        let _guard = self.guard.read().await;

        let mut last_err = FsError::NotFound(path.to_owned());
        for tier in &self.tiers {
            match tier.info(path).await {
                Ok(info) => return Ok(info),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// First-hit directory listing. Listings are never cached or
    /// back-propagated; only `read` fills lower tiers.
    pub async fn list(&self, path: &str) -> Result<Vec<FileInfo>, FsError> {
        let _guard = self.guard.read().await;

        let mut last_err = FsError::NotFound(path.to_owned());
        for tier in &self.tiers {
            match tier.list(path).await {
                Ok(entries) => return Ok(entries),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// Read the file from the first tier that has it, then copy the content
    /// into every updatable tier ahead of the hit.
    ///
    /// Fails with [`FsError::Busy`] while a write or exclusive lock is held.
    pub async fn read(&self, path: &str) -> Result<Bytes, FsError> {
        let _guard = self.guard.read().await;

        if let Some(lock) = self.lock_state(path).await? {
            if lock.lock_type.excludes_readers() {
                return Err(FsError::Busy);
            }
        }

        let mut last_err = FsError::NotFound(path.to_owned());
        for (idx, tier) in self.tiers.iter().enumerate() {
            match tier.read(path).await {
                Ok(content) => {
                    self.propagate(path, &content, idx).await;
                    return Ok(content);
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// Best-effort cache fill after a read hit at index `found`: failures are
    /// logged and dropped.
    async fn propagate(&self, path: &str, content: &[u8], found: usize) {
        for tier in self.tiers[..found].iter().rev() {
            if !tier.features().can_update {
                continue;
            }
            if let Err(e) = tier.write(path, content, PROPAGATED_MODE).await {
                warn!(path, error = %e, "cache fill failed");
            }
        }
    }

    /// Fan the write out to every updatable tier.
    ///
    /// A locked path rejects the write with [`FsError::Busy`] unless `pid`
    /// owns a write or exclusive lock on it. Tier failures do not abort the
    /// fan-out; the last one is returned.
    pub async fn write(
        &self,
        path: &str,
        content: &[u8],
        mode: u32,
        pid: Option<u32>,
    ) -> Result<(), FsError> {
        let _guard = self.guard.write().await;

        if let Some(lock) = self.lock_state(path).await? {
            let owner_write = pid == Some(lock.pid) && lock.lock_type.excludes_readers();
            if !owner_write {
                return Err(FsError::Busy);
            }
        }

        let mut failure = None;
        for tier in &self.tiers {
            if !tier.features().can_update {
                continue;
            }
            if let Err(e) = tier.write(path, content, mode).await {
                warn!(path, error = %e, "tier write failed");
                failure = Some(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fan the delete out to every delete-capable tier. Any lock on the path
    /// rejects the delete.
    pub async fn delete(&self, path: &str) -> Result<(), FsError> {
        let _guard = self.guard.write().await;

        if self.lock_state(path).await?.is_some() {
            return Err(FsError::Busy);
        }

        let mut failure = None;
        for tier in &self.tiers {
            if !tier.features().can_delete {
                continue;
            }
            if let Err(e) = tier.delete(path).await {
                warn!(path, error = %e, "tier delete failed");
                failure = Some(e);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Acquire a lock through the first lock-capable tier.
    pub async fn lock(&self, path: &str, lock_type: LockType, pid: u32) -> Result<(), FsError> {
        match self.lock_tier() {
            Some(tier) => tier.lock(path, lock_type, pid).await,
            None => Err(FsError::Unsupported),
        }
    }

    pub async fn unlock(&self, path: &str, pid: u32) -> Result<(), FsError> {
        match self.lock_tier() {
            Some(tier) => tier.unlock(path, pid).await,
            None => Err(FsError::Unsupported),
        }
    }

    pub async fn is_locked(&self, path: &str) -> Result<Option<LockType>, FsError> {
        Ok(self.lock_state(path).await?.map(|l| l.lock_type))
    }

    /// Union of the tiers' capabilities.
    #[must_use]
    pub fn features(&self) -> TierFeatures {
        self.tiers
            .iter()
            .fold(TierFeatures::default(), |acc, t| acc.union(t.features()))
    }

    /// Total resident bytes across all tiers.
    pub async fn usage(&self) -> Result<u64, FsError> {
        let _guard = self.guard.read().await;

        let mut total = 0u64;
        for tier in &self.tiers {
            total += tier.usage().await?;
        }
        Ok(total)
    }
}
