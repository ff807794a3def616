//! Bulk schedule and cancellation sweeps
//!
//! A cancellation sweep walks the local scheduler's entries and cancels those
//! in lost segments. It runs inline with the pre-phase notification and is
//! bounded by a deadline.
//!
//! A schedule sweep walks the entry store and schedules entries in gained
//! segments. It runs on the reactor's worker task; each sweep owns a
//! [`CancellationToken`] checked before every entry, and publishes its
//! progress through a [`SweepHandle`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::config::{MetadataMode, ReactorConfig};
use crate::cluster::{Member, SegmentResolver, SegmentSet};
use crate::metrics;
use crate::scheduler::local::{EntryStore, LocalScheduler};
use crate::scheduler::SchedulerError;
use crate::utils::lock;

/// Progress of a schedule sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SweepStatus {
    /// Queued behind the worker
    Pending,
    /// Being processed
    Running,
    /// Every gained entry was visited
    Completed { entries: usize },
    /// Stopped early; `entries` were scheduled before it stopped
    Cancelled { entries: usize },
}

impl SweepStatus {
    /// Whether the sweep will make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Cancelled { .. })
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed { .. } => "completed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Observer side of a submitted schedule sweep
#[derive(Debug, Clone)]
pub struct SweepHandle {
    id: Uuid,
    topology_id: u64,
    segments: SegmentSet,
    token: CancellationToken,
    status: watch::Receiver<SweepStatus>,
}

impl SweepHandle {
    /// Unique sweep id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Topology that triggered the sweep
    pub fn topology_id(&self) -> u64 {
        self.topology_id
    }

    /// Segments the sweep schedules
    pub fn segments(&self) -> &SegmentSet {
        &self.segments
    }

    /// Latest published status
    pub fn status(&self) -> SweepStatus {
        *self.status.borrow()
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request cancellation; the worker stops before its next entry
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for a terminal status
    ///
    /// A sweep dropped by a stopped worker reports `Cancelled`.
    pub async fn wait(&self) -> SweepStatus {
        let mut status = self.status.clone();
        let result = status.wait_for(SweepStatus::is_terminal).await.map(|s| *s);
        match result {
            Ok(terminal) => terminal,
            Err(_) => match *status.borrow() {
                terminal if terminal.is_terminal() => terminal,
                _ => SweepStatus::Cancelled { entries: 0 },
            },
        }
    }
}

/// Worker side of a submitted schedule sweep
#[derive(Debug)]
pub(crate) struct SweepJob {
    id: Uuid,
    topology_id: u64,
    segments: SegmentSet,
    token: CancellationToken,
    status: watch::Sender<SweepStatus>,
}

impl SweepJob {
    /// Create a pending job and its handle
    pub(crate) fn new(topology_id: u64, segments: SegmentSet) -> (Self, SweepHandle) {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let (status, receiver) = watch::channel(SweepStatus::Pending);
        let handle = SweepHandle {
            id,
            topology_id,
            segments: segments.clone(),
            token: token.clone(),
            status: receiver,
        };
        let job = Self {
            id,
            topology_id,
            segments,
            token,
            status,
        };
        (job, handle)
    }

    fn publish(&self, status: SweepStatus) {
        self.status.send_replace(status);
    }
}

/// Outcome of a cancellation sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Segments being released
    pub segments: SegmentSet,
    /// Local entries examined
    pub visited: usize,
    /// Entries cancelled
    pub cancelled: usize,
    /// Entries whose cancellation failed
    pub failed: usize,
    /// Stopped by the deadline or shutdown before visiting every entry
    pub interrupted: bool,
    /// When the sweep began
    pub started_at: DateTime<Utc>,
    /// Time spent
    pub elapsed: Duration,
}

/// Slot holding the most recent schedule sweep
pub(crate) type SweepSlot = Arc<Mutex<Option<SweepHandle>>>;

/// Collaborators shared by both sweep kinds
pub(crate) struct SweepContext<I, M> {
    pub(crate) member: Member,
    pub(crate) scheduler: Arc<dyn LocalScheduler<I, M>>,
    pub(crate) store: Arc<dyn EntryStore<I, M>>,
    pub(crate) segmenter: Arc<dyn SegmentResolver<I>>,
    pub(crate) config: ReactorConfig,
}

impl<I, M> SweepContext<I, M>
where
    I: std::fmt::Debug + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    /// Cancel local entries whose segment is in `lost`
    pub(crate) async fn cancel_segments(
        &self,
        lost: &SegmentSet,
        deadline: Instant,
        shutdown: &CancellationToken,
    ) -> SweepReport {
        let _timer = metrics::start_sweep_timer("cancel");
        let started = Instant::now();
        let mut report = SweepReport {
            segments: lost.clone(),
            visited: 0,
            cancelled: 0,
            failed: 0,
            interrupted: false,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
        };

        let entries = match self.scheduler.entries() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(member = %self.member, error = %e, "cannot list local entries for cancellation sweep");
                report.interrupted = true;
                report.elapsed = started.elapsed();
                metrics::record_sweep("cancel", "failed", 0);
                return report;
            }
        };

        let yield_every = self.config.yield_every.max(1);
        for (visited, id) in entries.into_iter().enumerate() {
            if visited > 0 && visited % yield_every == 0 {
                tokio::task::yield_now().await;
            }
            if shutdown.is_cancelled() || Instant::now() >= deadline {
                report.interrupted = true;
                break;
            }
            report.visited += 1;

            if !lost.contains(&self.segmenter.segment_of(&id)) {
                continue;
            }
            match self.scheduler.cancel(&id) {
                Ok(()) => report.cancelled += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(member = %self.member, id = ?id, error = %e, "failed to cancel entry in lost segment");
                }
            }
        }

        report.elapsed = started.elapsed();
        let outcome = if report.interrupted { "interrupted" } else { "completed" };
        metrics::record_sweep("cancel", outcome, report.cancelled);

        if report.interrupted {
            tracing::warn!(
                member = %self.member,
                segments = lost.len(),
                visited = report.visited,
                cancelled = report.cancelled,
                "cancellation sweep interrupted"
            );
        } else {
            tracing::debug!(
                member = %self.member,
                segments = lost.len(),
                cancelled = report.cancelled,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "cancellation sweep finished"
            );
        }
        report
    }

    /// Schedule store entries whose segment the job gained
    async fn schedule_segments(&self, job: &SweepJob) -> SweepStatus {
        if job.token.is_cancelled() {
            return SweepStatus::Cancelled { entries: 0 };
        }
        job.publish(SweepStatus::Running);

        let _timer = metrics::start_sweep_timer("schedule");
        let yield_every = self.config.yield_every.max(1);
        let mut scheduled = 0;

        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(member = %self.member, error = %e, "cannot list store entries for schedule sweep");
                return SweepStatus::Cancelled { entries: 0 };
            }
        };

        for (visited, id) in keys.into_iter().enumerate() {
            if job.token.is_cancelled() {
                return SweepStatus::Cancelled { entries: scheduled };
            }
            if visited > 0 && visited % yield_every == 0 {
                tokio::task::yield_now().await;
                if job.token.is_cancelled() {
                    return SweepStatus::Cancelled { entries: scheduled };
                }
            }

            if !job.segments.contains(&self.segmenter.segment_of(&id)) {
                continue;
            }

            let result = match self.config.metadata_mode {
                MetadataMode::Transient => self.scheduler.schedule(&id).map(|()| true),
                MetadataMode::Persistent => match self.store.metadata(&id) {
                    Ok(Some(metadata)) => self.scheduler.schedule_with(&id, metadata).map(|()| true),
                    Ok(None) => Ok(false),
                    Err(e) => Err(e),
                },
            };

            match result {
                Ok(true) => scheduled += 1,
                Ok(false) => {}
                Err(SchedulerError::Closed) => {
                    tracing::debug!(member = %self.member, "local scheduler closed during schedule sweep");
                    return SweepStatus::Cancelled { entries: scheduled };
                }
                Err(e) => {
                    tracing::warn!(member = %self.member, id = ?id, error = %e, "failed to schedule gained entry");
                }
            }
        }

        SweepStatus::Completed { entries: scheduled }
    }
}

/// Drain schedule sweeps one at a time until shutdown
pub(crate) async fn run_worker<I, M>(
    context: Arc<SweepContext<I, M>>,
    mut jobs: mpsc::UnboundedReceiver<SweepJob>,
    shutdown: CancellationToken,
    slot: SweepSlot,
) where
    I: std::fmt::Debug + Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    tracing::debug!(member = %context.member, "sweep worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let status = context.schedule_segments(&job).await;
        job.publish(status);

        let entries = match status {
            SweepStatus::Completed { entries } | SweepStatus::Cancelled { entries } => entries,
            SweepStatus::Pending | SweepStatus::Running => 0,
        };
        metrics::record_sweep("schedule", status.outcome(), entries);

        if matches!(status, SweepStatus::Completed { .. }) {
            let mut current = lock(&slot);
            if current.as_ref().is_some_and(|handle| handle.id() == job.id) {
                *current = None;
            }
        }

        tracing::debug!(
            member = %context.member,
            topology_id = job.topology_id,
            segments = job.segments.len(),
            status = status.outcome(),
            entries,
            "schedule sweep finished"
        );
    }

    tracing::debug!(member = %context.member, "sweep worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{HashSegmenter, Segment};
    use crate::scheduler::local::{MemoryScheduler, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore<String, u64>>,
        local: Arc<MemoryScheduler<String, u64>>,
        context: SweepContext<String, u64>,
    }

    fn fixture(entries: usize, mode: MetadataMode) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for i in 0..entries {
            store.insert(format!("entry-{i}"), i as u64);
        }
        let local = Arc::new(MemoryScheduler::new(store.clone() as Arc<dyn EntryStore<String, u64>>));
        let context = SweepContext {
            member: Member::new("a"),
            scheduler: local.clone(),
            store: store.clone(),
            segmenter: Arc::new(HashSegmenter::new(4)),
            config: ReactorConfig {
                metadata_mode: mode,
                yield_every: 4,
                ..ReactorConfig::default()
            },
        };
        Fixture { store, local, context }
    }

    fn all_segments() -> SegmentSet {
        (0..4).map(Segment).collect()
    }

    #[tokio::test]
    async fn test_schedule_sweep_covers_gained_segments_only() {
        let f = fixture(40, MetadataMode::Transient);
        let gained: SegmentSet = [Segment(1), Segment(3)].into_iter().collect();
        let (job, handle) = SweepJob::new(1, gained.clone());

        let status = f.context.schedule_segments(&job).await;

        let segmenter = HashSegmenter::new(4);
        let expected = (0..40)
            .map(|i| format!("entry-{i}"))
            .filter(|id| gained.contains(&segmenter.segment_of(id)))
            .count();
        assert_eq!(status, SweepStatus::Completed { entries: expected });
        assert_eq!(f.local.len(), expected);
        assert_eq!(handle.status(), SweepStatus::Running);
    }

    #[tokio::test]
    async fn test_persistent_mode_passes_store_metadata() {
        let f = fixture(8, MetadataMode::Persistent);
        let (job, _handle) = SweepJob::new(1, all_segments());

        f.context.schedule_segments(&job).await;

        assert_eq!(f.local.task(&"entry-5".to_string()).unwrap().metadata, 5);
        assert_eq!(f.local.len(), f.store.len());
    }

    #[tokio::test]
    async fn test_cancelled_job_is_skipped() {
        let f = fixture(8, MetadataMode::Transient);
        let (job, handle) = SweepJob::new(1, all_segments());
        handle.cancel();

        let status = f.context.schedule_segments(&job).await;

        assert_eq!(status, SweepStatus::Cancelled { entries: 0 });
        assert!(f.local.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_store_stops_schedule_sweep() {
        struct OfflineStore;

        impl EntryStore<String, u64> for OfflineStore {
            fn keys(&self) -> crate::scheduler::SchedulerResult<Vec<String>> {
                Err(SchedulerError::store_unavailable("keys", "offline"))
            }

            fn metadata(&self, _id: &String) -> crate::scheduler::SchedulerResult<Option<u64>> {
                Err(SchedulerError::store_unavailable("metadata", "offline"))
            }
        }

        let f = fixture(0, MetadataMode::Transient);
        let context = SweepContext {
            store: Arc::new(OfflineStore),
            ..f.context
        };
        let (job, _handle) = SweepJob::new(1, all_segments());

        assert_eq!(context.schedule_segments(&job).await, SweepStatus::Cancelled { entries: 0 });
        assert!(f.local.is_empty());
    }

    #[tokio::test]
    async fn test_wait_reports_cancelled_when_job_dropped() {
        let (job, handle) = SweepJob::new(1, all_segments());
        drop(job);
        assert_eq!(handle.wait().await, SweepStatus::Cancelled { entries: 0 });
    }

    #[tokio::test]
    async fn test_cancel_sweep_releases_lost_segments() {
        let f = fixture(40, MetadataMode::Transient);
        for i in 0..40 {
            f.local.schedule(&format!("entry-{i}")).unwrap();
        }
        let lost: SegmentSet = [Segment(0), Segment(2)].into_iter().collect();

        let report = f
            .context
            .cancel_segments(&lost, Instant::now() + Duration::from_secs(5), &CancellationToken::new())
            .await;

        let segmenter = HashSegmenter::new(4);
        assert!(!report.interrupted);
        assert_eq!(report.visited, 40);
        assert_eq!(report.failed, 0);
        assert_eq!(f.local.len(), 40 - report.cancelled);
        for id in f.local.entries().unwrap() {
            assert!(!lost.contains(&segmenter.segment_of(&id)));
        }
    }

    #[tokio::test]
    async fn test_cancel_sweep_honours_deadline() {
        let f = fixture(10, MetadataMode::Transient);
        for i in 0..10 {
            f.local.schedule(&format!("entry-{i}")).unwrap();
        }

        let report = f
            .context
            .cancel_segments(&all_segments(), Instant::now(), &CancellationToken::new())
            .await;

        assert!(report.interrupted);
        assert_eq!(report.visited, 0);
        assert_eq!(f.local.len(), 10);
    }

    #[tokio::test]
    async fn test_cancel_sweep_stops_on_shutdown() {
        let f = fixture(10, MetadataMode::Transient);
        for i in 0..10 {
            f.local.schedule(&format!("entry-{i}")).unwrap();
        }
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let report = f
            .context
            .cancel_segments(&all_segments(), Instant::now() + Duration::from_secs(5), &shutdown)
            .await;

        assert!(report.interrupted);
        assert_eq!(report.cancelled, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_cancel_sweep_yields_to_other_tasks() {
        let f = fixture(40, MetadataMode::Transient);
        for i in 0..40 {
            f.local.schedule(&format!("entry-{i}")).unwrap();
        }
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        tokio::spawn(async move {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        let report = f
            .context
            .cancel_segments(&all_segments(), Instant::now() + Duration::from_secs(5), &CancellationToken::new())
            .await;

        assert_eq!(report.cancelled, 40);
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
