//! Sweep supersession tests
//!
//! Two ownership changes in quick succession: the second schedule sweep
//! replaces the first, and only the second event's gained segments end up
//! scheduled. The abandoned sweep is never completed.

use std::collections::BTreeSet;

use super::fixtures::{entry_ids, fast_config, TestCluster};
use jikimi::cluster::Segment;
use jikimi::scheduler::{LocalScheduler, Scheduler};
use jikimi::topology::SweepStatus;

/// Config whose sweeps never yield mid-event, so the first sweep stays queued
fn unyielding_config() -> jikimi::config::Config {
    let mut config = fast_config(4);
    config.topology.yield_every = 1_024;
    config
}

fn in_segments(cluster: &TestCluster, ids: &[String], segments: &[u32]) -> Vec<String> {
    let segments: BTreeSet<Segment> = segments.iter().copied().map(Segment).collect();
    ids.iter()
        .filter(|id| segments.contains(&cluster.segment_of(id)))
        .cloned()
        .collect()
}

#[tokio::test(flavor = "current_thread")]
async fn test_rapid_gains_keep_only_second_gained_set() {
    let mut cluster = TestCluster::start("a", 100, unyielding_config());
    let ids = entry_ids(100);
    for id in &ids {
        cluster.node("a").scheduler().schedule(id).await;
    }

    cluster.join("b");
    cluster.assign(&["a", "b", "a", "b"]).await;
    let first = cluster.node("b").reactor().current_sweep().unwrap();

    cluster.assign(&["b"; 4]).await;
    let second = cluster.node("b").reactor().current_sweep().unwrap();

    assert_ne!(first.id(), second.id());
    assert!(first.is_cancelled());
    let gained: BTreeSet<Segment> = [Segment(0), Segment(2)].into_iter().collect();
    assert_eq!(second.segments(), &gained);

    assert_eq!(first.wait().await, SweepStatus::Cancelled { entries: 0 });
    let expected = in_segments(&cluster, &ids, &[0, 2]);
    assert_eq!(
        second.wait().await,
        SweepStatus::Completed { entries: expected.len() }
    );

    let b = cluster.node("b").local();
    assert_eq!(b.len(), expected.len());
    for id in &expected {
        assert!(b.contains(id).unwrap(), "{id} from the second gain missing");
    }
    for id in in_segments(&cluster, &ids, &[1, 3]) {
        assert!(!b.contains(&id).unwrap(), "{id} from the abandoned sweep scheduled");
    }
    assert!(cluster.node("a").local().is_empty());

    cluster.shutdown().await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_loss_abandons_pending_sweep() {
    let mut cluster = TestCluster::start("a", 100, unyielding_config());
    let ids = entry_ids(100);
    cluster.join("b");

    cluster.assign(&["b"; 4]).await;
    let first = cluster.node("b").reactor().current_sweep().unwrap();

    // b loses two segments before its first sweep ran
    cluster.assign(&["a", "b", "a", "b"]).await;
    assert!(first.is_cancelled());
    assert_eq!(first.wait().await, SweepStatus::Cancelled { entries: 0 });
    assert!(cluster.node("b").reactor().current_sweep().is_none());

    cluster.settle().await;

    let a = cluster.node("a").local();
    let regained = in_segments(&cluster, &ids, &[0, 2]);
    assert_eq!(a.len(), regained.len());
    for id in &regained {
        assert!(a.contains(id).unwrap(), "{id} missing on a");
    }
    assert!(cluster.node("b").local().is_empty());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_close_cancels_in_flight_sweep() {
    let mut cluster = TestCluster::start("a", 50, fast_config(4));
    cluster.join("b");
    cluster.assign(&["b"; 4]).await;

    let sweep = cluster.node("b").reactor().current_sweep();
    cluster.node("b").reactor().close().await;

    if let Some(sweep) = sweep {
        assert!(sweep.wait().await.is_terminal());
    }
    assert!(cluster.node("b").reactor().current_sweep().is_none());

    cluster.shutdown().await;
}
