//! Dispatch retry tests
//!
//! Failures talking to an owner are retried with backoff, and every attempt
//! resolves the owner again, so an operation that raced an ownership change
//! lands on the new owner.

use std::time::Duration;

use super::fixtures::{fast_config, TestCluster};
use jikimi::cluster::Member;
use jikimi::scheduler::{DispatchError, LocalScheduler, Scheduler};

#[tokio::test]
async fn test_unreachable_owner_exhausts_retries_quietly() {
    let mut cluster = TestCluster::start("a", 0, fast_config(4));
    cluster.join("b");
    cluster.assign(&["b"; 4]).await;
    cluster.transport.unbind(&Member::new("b"));

    let id = "orphan".to_string();
    let a = cluster.node("a").scheduler();
    a.schedule_with(&id, 1).await;
    a.cancel(&id).await;

    assert!(!a.contains(&id).await);
    assert!(cluster.node("b").local().is_empty());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_retry_follows_ownership_change() {
    let mut config = fast_config(4);
    config.dispatch.max_retries = 10;
    config.dispatch.base_delay_ms = 10;
    config.dispatch.max_delay_ms = 10;
    let mut cluster = TestCluster::start("a", 0, config);
    cluster.join("b");
    cluster.assign(&["b"; 4]).await;
    cluster.transport.unbind(&Member::new("b"));

    // Not in the entry store, so no sweep can schedule it on a's behalf.
    let id = "in-flight".to_string();
    let a = cluster.node("a");
    tokio::join!(a.scheduler().schedule_with(&id, 7), async {
        tokio::time::sleep(Duration::from_millis(25)).await;
        cluster.assign(&["a"; 4]).await;
    });

    assert_eq!(a.local().task(&id).unwrap().metadata, 7);
    assert!(a.scheduler().contains(&id).await);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_remote_owner_executes_command() {
    let mut cluster = TestCluster::start("a", 0, fast_config(4));
    cluster.join("b");
    cluster.assign(&["b"; 4]).await;

    let id = "remote".to_string();
    cluster.node("a").scheduler().schedule_with(&id, 42).await;

    let b = cluster.node("b").local();
    assert_eq!(b.task(&id).unwrap().metadata, 42);
    assert!(!cluster.node("a").local().contains(&id).unwrap());

    let listed = cluster
        .node("a")
        .scheduler()
        .entries_on(&Member::new("b"))
        .await
        .unwrap();
    assert_eq!(listed, vec![id]);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_entries_on_unknown_member_fails() {
    let cluster = TestCluster::start("a", 0, fast_config(4));

    let result = cluster
        .node("a")
        .scheduler()
        .entries_on(&Member::new("ghost"))
        .await;
    assert_eq!(result, Err(DispatchError::Unreachable(Member::new("ghost"))));

    cluster.shutdown().await;
}
