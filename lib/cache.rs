//! LRU-by-last-use accounting for a cache-role tier.
//!
//! [`CacheController`] records which files are resident in the tier's root,
//! their sizes, and when they were last touched, and evicts least-recently
//! used files to keep the total under the configured byte budget.

use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::FsError;

#[derive(Debug, Clone)]
struct CacheEntry {
    path: String,
    size: u64,
    last_used: Instant,
}

/// Tracks the files resident in a cache tier and enforces its byte budget.
///
/// The entry list is insertion-ordered and rewritten on every touch; with the
/// handful of files a cache tier typically holds this is simpler than keeping
/// a heap. The mutex is held for the full duration of each operation,
/// including the backing-store deletions inside [`ensure_room`], so eviction
/// can never race its own bookkeeping.
///
/// [`ensure_room`]: CacheController::ensure_room
pub struct CacheController {
    root: PathBuf,
    budget: u64,
    entries: Mutex<Vec<CacheEntry>>,
}

impl CacheController {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, budget: u64) -> Self {
        Self {
            root: root.into(),
            budget,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Record a read or write of `path`, refreshing its `last_used` stamp.
    ///
    /// Any prior entry for the path is replaced.
    pub async fn touch(&self, path: &str, size: u64) {
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.path != path);
        entries.push(CacheEntry {
            path: path.to_owned(),
            size,
            last_used: Instant::now(),
        });
    }

    /// Drop any entry for `path`. A no-op when the path is not tracked.
    pub async fn forget(&self, path: &str) {
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.path != path);
    }

    /// Evict least-recently used files until `needed` more bytes fit within
    /// the budget, deleting the evicted files from the tier root.
    ///
    /// Ties on `last_used` break toward the earliest entry. A failed
    /// backing-store deletion aborts eviction and surfaces the error.
    pub async fn ensure_room(&self, needed: u64) -> Result<(), FsError> {
        let mut entries = self.entries.lock().await;
        let mut current: u64 = entries.iter().map(|e| e.size).sum();

        while current + needed > self.budget && !entries.is_empty() {
            let Some(victim_idx) = entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(i, _)| i)
            else {
                break;
            };

            let victim = entries[victim_idx].clone();
            let full = self.root.join(victim.path.trim_start_matches('/'));
            tokio::fs::remove_file(&full)
                .await
                .map_err(|e| FsError::from_io(&victim.path, e))?;
            debug!(path = %victim.path, size = victim.size, "evicted from cache");

            current -= victim.size;
            entries.remove(victim_idx);
        }

        Ok(())
    }

    /// Sum of the tracked entry sizes.
    pub async fn resident_bytes(&self) -> u64 {
        self.entries.lock().await.iter().map(|e| e.size).sum()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.entries.lock().await.iter().any(|e| e.path == path)
    }
}
