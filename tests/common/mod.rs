#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use remotefs::error::FsError;
use remotefs::model::{FileInfo, FileLock, LockType, TierFeatures, TierRole};
use remotefs::tier::{LocalTier, LocalTierConfig, Tier};

/// A fully-capable authoritative tier.
pub fn main_tier(root: &Path) -> LocalTier {
    LocalTier::open(LocalTierConfig {
        root: root.to_path_buf(),
        role: TierRole::Main,
        features: TierFeatures {
            can_update: true,
            can_delete: true,
            can_lock: false,
        },
        max_size: 0,
    })
    .unwrap()
}

/// A main tier that also carries the chain's lock table.
pub fn lockable_main_tier(root: &Path) -> LocalTier {
    LocalTier::open(LocalTierConfig {
        root: root.to_path_buf(),
        role: TierRole::Main,
        features: TierFeatures {
            can_update: true,
            can_delete: true,
            can_lock: true,
        },
        max_size: 0,
    })
    .unwrap()
}

/// A budgeted cache tier.
pub fn cache_tier(root: &Path, budget: u64) -> LocalTier {
    LocalTier::open(LocalTierConfig {
        root: root.to_path_buf(),
        role: TierRole::Cache,
        features: TierFeatures {
            can_update: true,
            can_delete: true,
            can_lock: false,
        },
        max_size: budget,
    })
    .unwrap()
}

/// A tier with no capabilities at all (reads and metadata only).
pub fn read_only_tier(root: &Path) -> LocalTier {
    LocalTier::open(LocalTierConfig {
        root: root.to_path_buf(),
        role: TierRole::Main,
        features: TierFeatures::default(),
        max_size: 0,
    })
    .unwrap()
}

/// Place a file directly under a tier root, bypassing the engine.
pub fn seed(root: &Path, path: &str, content: &[u8]) {
    let full = root.join(path.trim_start_matches('/'));
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, content).unwrap();
}

/// Sum of file sizes under a tier root, as a disk-level view of residency.
pub fn disk_usage(root: &Path) -> u64 {
    let mut total = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let meta = entry.metadata().unwrap();
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }
    total
}

/// An updatable, deletable tier whose every operation fails with an I/O
/// error. Used to observe that fan-out keeps going past failing tiers.
pub struct FailingTier;

fn boom() -> FsError {
    FsError::Io(std::io::Error::other("tier offline"))
}

#[async_trait]
impl Tier for FailingTier {
    async fn info(&self, _path: &str) -> Result<FileInfo, FsError> {
        Err(boom())
    }

    async fn list(&self, _path: &str) -> Result<Vec<FileInfo>, FsError> {
        Err(boom())
    }

    async fn read(&self, _path: &str) -> Result<Bytes, FsError> {
        Err(boom())
    }

    async fn write(&self, _path: &str, _content: &[u8], _mode: u32) -> Result<(), FsError> {
        Err(boom())
    }

    async fn delete(&self, _path: &str) -> Result<(), FsError> {
        Err(boom())
    }

    async fn lock(&self, _path: &str, _lock_type: LockType, _pid: u32) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    async fn unlock(&self, _path: &str, _pid: u32) -> Result<(), FsError> {
        Err(FsError::Unsupported)
    }

    async fn lock_state(&self, _path: &str) -> Result<Option<FileLock>, FsError> {
        Err(FsError::Unsupported)
    }

    fn features(&self) -> TierFeatures {
        TierFeatures {
            can_update: true,
            can_delete: true,
            can_lock: false,
        }
    }

    fn role(&self) -> TierRole {
        TierRole::Main
    }

    async fn usage(&self) -> Result<u64, FsError> {
        Err(boom())
    }
}
