#![allow(clippy::unwrap_used, missing_docs)]

mod common;

use common::{lockable_main_tier, seed};
use remotefs::chain::Chain;
use remotefs::error::FsError;
use remotefs::model::LockType;

fn locked_chain(main_root: &tempfile::TempDir) -> Chain {
    Chain::new(vec![Box::new(lockable_main_tier(main_root.path()))])
}

#[tokio::test]
async fn two_readers_coalesce_and_block_writers_until_release() {
    let main_root = tempfile::tempdir().unwrap();
    seed(main_root.path(), "p", b"data");
    let chain = locked_chain(&main_root);

    chain.lock("p", LockType::Read, 1).await.unwrap();
    chain.lock("p", LockType::Read, 2).await.unwrap();
    assert_eq!(chain.is_locked("p").await.unwrap(), Some(LockType::Read));

    assert!(
        matches!(chain.write("p", b"x", 0o644, None).await, Err(FsError::Busy)),
        "a read-locked path must refuse writes"
    );

    chain.unlock("p", 1).await.unwrap();
    // The second reader never owned a record of its own.
    assert!(matches!(
        chain.unlock("p", 2).await,
        Err(FsError::NotLocked)
    ));

    chain.write("p", b"x", 0o644, None).await.unwrap();
    assert_eq!(std::fs::read(main_root.path().join("p")).unwrap(), b"x");
}

#[tokio::test]
async fn at_most_one_lock_record_per_path() {
    let main_root = tempfile::tempdir().unwrap();
    seed(main_root.path(), "p", b"data");
    let chain = locked_chain(&main_root);

    chain.lock("p", LockType::Exclusive, 1).await.unwrap();
    for (ty, pid) in [
        (LockType::Read, 2),
        (LockType::Write, 2),
        (LockType::Exclusive, 1),
    ] {
        assert!(
            matches!(chain.lock("p", ty, pid).await, Err(FsError::Busy)),
            "{ty:?} by pid {pid} should be refused"
        );
    }
    assert_eq!(
        chain.is_locked("p").await.unwrap(),
        Some(LockType::Exclusive)
    );
}

#[tokio::test]
async fn release_by_a_non_owner_fails() {
    let main_root = tempfile::tempdir().unwrap();
    seed(main_root.path(), "p", b"data");
    let chain = locked_chain(&main_root);

    chain.lock("p", LockType::Write, 1).await.unwrap();
    assert!(matches!(chain.unlock("p", 2).await, Err(FsError::NotOwner)));

    // Still locked; the failed release must not have touched the record.
    assert_eq!(chain.is_locked("p").await.unwrap(), Some(LockType::Write));
    chain.unlock("p", 1).await.unwrap();
    assert_eq!(chain.is_locked("p").await.unwrap(), None);
}

#[tokio::test]
async fn unlock_without_a_lock_fails() {
    let main_root = tempfile::tempdir().unwrap();
    seed(main_root.path(), "p", b"data");
    let chain = locked_chain(&main_root);

    assert!(matches!(
        chain.unlock("p", 1).await,
        Err(FsError::NotLocked)
    ));
}

#[tokio::test]
async fn locking_a_missing_file_fails() {
    let main_root = tempfile::tempdir().unwrap();
    let chain = locked_chain(&main_root);

    assert!(
        chain
            .lock("absent", LockType::Read, 1)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn lock_released_paths_can_be_relocked() {
    let main_root = tempfile::tempdir().unwrap();
    seed(main_root.path(), "p", b"data");
    let chain = locked_chain(&main_root);

    chain.lock("p", LockType::Exclusive, 1).await.unwrap();
    chain.unlock("p", 1).await.unwrap();
    chain.lock("p", LockType::Write, 2).await.unwrap();
    assert_eq!(chain.is_locked("p").await.unwrap(), Some(LockType::Write));
}
