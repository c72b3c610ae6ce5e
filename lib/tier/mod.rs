//! Storage tier contract and implementations.

pub mod local;

pub use local::{LocalTier, LocalTierConfig};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FsError;
use crate::model::{FileInfo, FileLock, LockType, TierFeatures, TierRole};

/// A single storage backend in the chain.
///
/// Everything is path-addressed: a slash-separated UTF-8 path is the sole
/// identity of a file across tiers. `read` and `write` move whole files;
/// offset and range handling live in the FUSE adapter. Implementations must
/// be safe to call from many concurrent requests.
#[async_trait]
pub trait Tier: Send + Sync {
    async fn info(&self, path: &str) -> Result<FileInfo, FsError>;

    async fn list(&self, path: &str) -> Result<Vec<FileInfo>, FsError>;

    /// Read the entire file.
    async fn read(&self, path: &str) -> Result<Bytes, FsError>;

    /// Create missing parent directories, truncate any existing file, leave
    /// the file with exactly `mode`, and settle cache accounting before
    /// returning. Fails with [`FsError::Unsupported`] without `can_update`.
    async fn write(&self, path: &str, content: &[u8], mode: u32) -> Result<(), FsError>;

    /// Fails with [`FsError::Unsupported`] without `can_delete`.
    async fn delete(&self, path: &str) -> Result<(), FsError>;

    /// Take an advisory lock. Fails with [`FsError::Unsupported`] on tiers
    /// without `can_lock`; the chain only ever delegates to its first
    /// lock-capable tier.
    async fn lock(&self, path: &str, lock_type: LockType, pid: u32) -> Result<(), FsError>;

    async fn unlock(&self, path: &str, pid: u32) -> Result<(), FsError>;

    /// The current lock record on `path`, if any.
    async fn lock_state(&self, path: &str) -> Result<Option<FileLock>, FsError>;

    fn features(&self) -> TierFeatures;

    fn role(&self) -> TierRole;

    /// Total resident bytes under the tier's root.
    async fn usage(&self) -> Result<u64, FsError>;
}
