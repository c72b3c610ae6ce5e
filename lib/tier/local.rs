//! A tier backed by a directory on the local filesystem.
//!
//! Files are stored directly under the configured root, preserving the
//! virtual path verbatim. There is no sidecar metadata: mode and mtime are
//! whatever the underlying filesystem records.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use super::Tier;
use crate::cache::CacheController;
use crate::error::FsError;
use crate::lock::LockTable;
use crate::model::{FileInfo, FileLock, LockType, TierFeatures, TierRole};

/// Configuration for a [`LocalTier`].
#[derive(Debug, Clone)]
pub struct LocalTierConfig {
    pub root: PathBuf,
    pub role: TierRole,
    pub features: TierFeatures,
    /// Byte budget. Must be positive for cache-role tiers; ignored otherwise.
    pub max_size: u64,
}

pub struct LocalTier {
    root: PathBuf,
    features: TierFeatures,
    role: TierRole,
    cache: Option<CacheController>,
    locks: Option<LockTable>,
}

impl LocalTier {
    /// Open the tier, creating its root directory if needed.
    pub fn open(config: LocalTierConfig) -> Result<Self, FsError> {
        if config.role == TierRole::Cache && config.max_size == 0 {
            return Err(FsError::Malformed(
                "cache filesystem requires a positive max_size".to_owned(),
            ));
        }

        let root = std::path::absolute(&config.root)?;
        std::fs::create_dir_all(&root)?;

        let cache = (config.role == TierRole::Cache)
            .then(|| CacheController::new(root.clone(), config.max_size));
        let locks = config.features.can_lock.then(LockTable::new);

        Ok(Self {
            root,
            features: config.features,
            role: config.role,
            cache,
            locks,
        })
    }

    /// The tier's cache accounting, present only on cache-role tiers.
    #[must_use]
    pub fn cache(&self) -> Option<&CacheController> {
        self.cache.as_ref()
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn entry_name(path: &str) -> String {
    path.rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or("/")
        .to_owned()
}

#[async_trait]
impl Tier for LocalTier {
    async fn info(&self, path: &str) -> Result<FileInfo, FsError> {
        let meta = tokio::fs::metadata(self.full_path(path))
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(FileInfo::from_metadata(entry_name(path), &meta))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileInfo>, FsError> {
        let mut dir = tokio::fs::read_dir(self.full_path(path))
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(FsError::Io)? {
            // Entries that vanish mid-listing are skipped, not fatal.
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(FileInfo::from_metadata(name, &meta));
        }
        Ok(entries)
    }

    async fn read(&self, path: &str) -> Result<Bytes, FsError> {
        let content = tokio::fs::read(self.full_path(path))
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        if let Some(cache) = &self.cache {
            cache.touch(path, content.len() as u64).await;
        }
        Ok(Bytes::from(content))
    }

    async fn write(&self, path: &str, content: &[u8], mode: u32) -> Result<(), FsError> {
        use std::os::unix::fs::PermissionsExt as _;

        if !self.features.can_update {
            return Err(FsError::Unsupported);
        }

        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::from_io(path, e))?;
        }

        if let Some(cache) = &self.cache {
            cache.ensure_room(content.len() as u64).await?;
        }

        tokio::fs::write(&full, content)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        // tokio::fs::write honors the umask; force the requested bits.
        tokio::fs::set_permissions(&full, std::fs::Permissions::from_mode(mode & 0o7777))
            .await
            .map_err(FsError::Io)?;

        if let Some(cache) = &self.cache {
            cache.touch(path, content.len() as u64).await;
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), FsError> {
        if !self.features.can_delete {
            return Err(FsError::Unsupported);
        }

        tokio::fs::remove_file(self.full_path(path))
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        if let Some(cache) = &self.cache {
            cache.forget(path).await;
        }
        Ok(())
    }

    async fn lock(&self, path: &str, lock_type: LockType, pid: u32) -> Result<(), FsError> {
        let Some(locks) = &self.locks else {
            return Err(FsError::Unsupported);
        };

        // A lock needs a file to attach to.
        tokio::fs::metadata(self.full_path(path))
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        locks.acquire(path, lock_type, pid)
    }

    async fn unlock(&self, path: &str, pid: u32) -> Result<(), FsError> {
        let Some(locks) = &self.locks else {
            return Err(FsError::Unsupported);
        };
        locks.release(path, pid)
    }

    async fn lock_state(&self, path: &str) -> Result<Option<FileLock>, FsError> {
        let Some(locks) = &self.locks else {
            return Err(FsError::Unsupported);
        };
        Ok(locks.query(path))
    }

    fn features(&self) -> TierFeatures {
        self.features
    }

    fn role(&self) -> TierRole {
        self.role
    }

    async fn usage(&self) -> Result<u64, FsError> {
        let mut total = 0u64;
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(FsError::Io)?;
            while let Some(entry) = entries.next_entry().await.map_err(FsError::Io)? {
                let meta = entry.metadata().await.map_err(FsError::Io)?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }
}
