#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use std::time::Duration;

use common::{cache_tier, disk_usage, main_tier, seed};
use remotefs::chain::Chain;

/// Instant has nanosecond resolution, but put a little daylight between
/// operations so `last_used` ordering is unambiguous.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn third_read_evicts_the_least_recently_used_entry() {
    let cache_root = tempfile::tempdir().unwrap();
    let main_root = tempfile::tempdir().unwrap();
    seed(main_root.path(), "a", b"12345");
    seed(main_root.path(), "b", b"12345");
    seed(main_root.path(), "c", b"12345");

    let chain = Chain::new(vec![
        Box::new(cache_tier(cache_root.path(), 10)),
        Box::new(main_tier(main_root.path())),
    ]);

    chain.read("a").await.unwrap();
    settle().await;
    chain.read("b").await.unwrap();
    settle().await;
    chain.read("c").await.unwrap();

    assert!(
        !cache_root.path().join("a").exists(),
        "a has the smallest last_used and must be evicted"
    );
    assert!(cache_root.path().join("b").exists(), "b should survive");
    assert!(cache_root.path().join("c").exists(), "c was just cached");
}

#[tokio::test]
async fn rereading_refreshes_recency_before_eviction() {
    let cache_root = tempfile::tempdir().unwrap();
    let main_root = tempfile::tempdir().unwrap();
    seed(main_root.path(), "a", b"12345");
    seed(main_root.path(), "b", b"12345");
    seed(main_root.path(), "c", b"12345");

    let chain = Chain::new(vec![
        Box::new(cache_tier(cache_root.path(), 10)),
        Box::new(main_tier(main_root.path())),
    ]);

    chain.read("a").await.unwrap();
    settle().await;
    chain.read("b").await.unwrap();
    settle().await;
    // This hit lands in the cache tier and refreshes a's last_used.
    chain.read("a").await.unwrap();
    settle().await;
    chain.read("c").await.unwrap();

    assert!(
        cache_root.path().join("a").exists(),
        "a was refreshed and must outlive b"
    );
    assert!(
        !cache_root.path().join("b").exists(),
        "b is now least recently used"
    );
    assert!(cache_root.path().join("c").exists());
}

#[tokio::test]
async fn cache_stays_within_budget_across_mixed_operations() {
    const BUDGET: u64 = 10;

    let cache_root = tempfile::tempdir().unwrap();
    let main_root = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c", "d"] {
        seed(main_root.path(), name, b"1234");
    }

    let chain = Chain::new(vec![
        Box::new(cache_tier(cache_root.path(), BUDGET)),
        Box::new(main_tier(main_root.path())),
    ]);

    for name in ["a", "b", "c", "d"] {
        chain.read(name).await.unwrap();
        settle().await;
        assert!(
            disk_usage(cache_root.path()) <= BUDGET,
            "budget exceeded after reading {name}"
        );
    }

    chain.write("e", b"1234", 0o644, None).await.unwrap();
    assert!(
        disk_usage(cache_root.path()) <= BUDGET,
        "budget exceeded after a write"
    );
}

#[tokio::test]
async fn eviction_prefers_the_smallest_last_used_across_sizes() {
    let cache_root = tempfile::tempdir().unwrap();
    let main_root = tempfile::tempdir().unwrap();
    seed(main_root.path(), "big", b"12345678");
    seed(main_root.path(), "small", b"1");
    seed(main_root.path(), "next", b"1234");

    let chain = Chain::new(vec![
        Box::new(cache_tier(cache_root.path(), 10)),
        Box::new(main_tier(main_root.path())),
    ]);

    chain.read("big").await.unwrap();
    settle().await;
    chain.read("small").await.unwrap();
    settle().await;
    // 8 + 1 resident; 4 more requires evicting `big` (oldest), which alone
    // frees enough room.
    chain.read("next").await.unwrap();

    assert!(!cache_root.path().join("big").exists());
    assert!(cache_root.path().join("small").exists());
    assert!(cache_root.path().join("next").exists());
}

#[tokio::test]
async fn delete_drops_the_cache_entry_and_its_accounting() {
    let cache_root = tempfile::tempdir().unwrap();
    let main_root = tempfile::tempdir().unwrap();

    let chain = Chain::new(vec![
        Box::new(cache_tier(cache_root.path(), 10)),
        Box::new(main_tier(main_root.path())),
    ]);

    chain.write("x", b"1234567890", 0o644, None).await.unwrap();
    chain.delete("x").await.unwrap();
    assert_eq!(disk_usage(cache_root.path()), 0);

    // A forgotten entry must not count against the budget: the full budget
    // is available again.
    chain.write("y", b"1234567890", 0o644, None).await.unwrap();
    assert!(cache_root.path().join("y").exists());
}
