//! Entry migration tests
//!
//! Tasks must follow their keys when segments change owner: the losing
//! member cancels them, the gaining member schedules them, and keys whose
//! segment did not move are left alone.

use super::fixtures::{entry_ids, fast_config, TestCluster};
use jikimi::cluster::Member;
use jikimi::scheduler::{LocalScheduler, Scheduler};
use jikimi::topology::{MetadataMode, SweepStatus};

async fn schedule_all(cluster: &TestCluster, ids: &[String]) {
    let scheduler = cluster.node("a").scheduler();
    for id in ids {
        scheduler.schedule(id).await;
    }
}

#[tokio::test]
async fn test_two_segments_move_to_joining_member() {
    let mut cluster = TestCluster::start("a", 100, fast_config(4));
    let ids = entry_ids(100);
    schedule_all(&cluster, &ids).await;
    assert_eq!(cluster.node("a").local().len(), 100);

    cluster.join("b");
    cluster.assign(&["a", "b", "a", "b"]).await;
    let statuses = cluster.settle().await;
    assert!(statuses.iter().all(|s| matches!(s, SweepStatus::Completed { .. })));

    let a = cluster.node("a").local();
    let b = cluster.node("b").local();
    let mut moved = 0;
    for id in &ids {
        if cluster.owner_of(id) == Member::new("b") {
            moved += 1;
            assert!(b.contains(id).unwrap(), "{id} should be scheduled on b");
            assert!(!a.contains(id).unwrap(), "{id} should be cancelled on a");
        } else {
            assert!(a.contains(id).unwrap(), "{id} should stay on a");
            assert!(!b.contains(id).unwrap(), "{id} should not be on b");
        }
    }
    assert!(moved > 0 && moved < 100);
    assert_eq!(a.len() + b.len(), 100);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_contains_agrees_from_every_member_after_migration() {
    let mut cluster = TestCluster::start("a", 40, fast_config(4));
    let ids = entry_ids(40);
    schedule_all(&cluster, &ids).await;

    cluster.join("b");
    cluster.assign(&["b", "b", "a", "b"]).await;
    cluster.settle().await;

    for id in &ids {
        assert!(cluster.node("a").scheduler().contains(id).await);
        assert!(cluster.node("b").scheduler().contains(id).await);
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_leaving_member_hands_entries_back() {
    let mut cluster = TestCluster::start("a", 60, fast_config(8));
    let ids = entry_ids(60);
    schedule_all(&cluster, &ids).await;

    cluster.join("b");
    cluster.assign(&["a", "b", "a", "b", "a", "b", "a", "b"]).await;
    cluster.settle().await;
    assert!(!cluster.node("b").local().is_empty());

    cluster.assign(&["a"; 8]).await;
    cluster.settle().await;

    assert_eq!(cluster.node("a").local().len(), 60);
    assert!(cluster.node("b").local().is_empty());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_persistent_mode_carries_store_metadata() {
    let mut config = fast_config(4);
    config.topology.metadata_mode = MetadataMode::Persistent;
    let mut cluster = TestCluster::start("a", 20, config);
    let ids = entry_ids(20);
    schedule_all(&cluster, &ids).await;

    for (i, id) in ids.iter().enumerate() {
        cluster.store.insert(id.clone(), 1_000 + i as u64);
    }

    cluster.join("b");
    cluster.assign(&["b"; 4]).await;
    cluster.settle().await;

    let b = cluster.node("b").local();
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(b.task(id).unwrap().metadata, 1_000 + i as u64);
    }
    assert!(cluster.node("a").local().is_empty());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_removed_entry_is_not_rescheduled() {
    let mut cluster = TestCluster::start("a", 10, fast_config(4));
    let ids = entry_ids(10);
    schedule_all(&cluster, &ids).await;

    cluster.store.remove(&ids[0]);
    cluster.join("b");
    cluster.assign(&["b"; 4]).await;
    cluster.settle().await;

    let b = cluster.node("b").local();
    assert!(!b.contains(&ids[0]).unwrap());
    assert_eq!(b.len(), 9);

    cluster.shutdown().await;
}
