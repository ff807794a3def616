//! Topology change reactor
//!
//! Keeps a member's local scheduler aligned with the segments it owns:
//!
//! ```text
//!            pre (lost ≠ ∅)                       post (gained ≠ ∅)
//!  event ──▶ cancel in-flight sweep         event ──▶ submit schedule sweep
//!            cancellation sweep (inline,              replace slot, cancel the
//!            bounded by deadline)                     displaced sweep
//!                                                           │
//!                                                           ▼
//!                                                   single worker task
//! ```
//!
//! At most one schedule sweep is in flight. Every post-phase event cancels
//! the previous sweep; the newest event's gained segments are the only ones
//! swept, and an unfinished displaced sweep is abandoned.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::ReactorConfig;
use super::sweep::{run_worker, SweepContext, SweepHandle, SweepJob, SweepReport, SweepSlot};
use crate::cluster::{
    ChangePhase, ListenerId, Member, SegmentResolver, SegmentSet, TopologyChangeEvent, TopologyEventSource,
    TopologyListener,
};
use crate::metrics;
use crate::scheduler::local::{EntryStore, LocalScheduler};
use crate::scheduler::{Key, Metadata};
use crate::utils::lock;

/// Reacts to ownership changes of one member
pub struct TopologyChangeReactor<I, M> {
    context: Arc<SweepContext<I, M>>,
    events: Arc<TopologyEventSource>,
    listener: Mutex<Option<ListenerId>>,
    jobs: Mutex<Option<mpsc::UnboundedSender<SweepJob>>>,
    slot: SweepSlot,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Listener registered on the event source; holds the reactor weakly
struct ReactorListener<I, M>(Weak<TopologyChangeReactor<I, M>>);

#[async_trait]
impl<I: Key, M: Metadata> TopologyListener for ReactorListener<I, M> {
    async fn topology_changed(&self, event: &TopologyChangeEvent) {
        if let Some(reactor) = self.0.upgrade() {
            reactor.handle(event).await;
        }
    }
}

impl<I: Key, M: Metadata> TopologyChangeReactor<I, M> {
    /// Start the sweep worker and subscribe to `events`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        member: Member,
        scheduler: Arc<dyn LocalScheduler<I, M>>,
        store: Arc<dyn EntryStore<I, M>>,
        segmenter: Arc<dyn SegmentResolver<I>>,
        events: Arc<TopologyEventSource>,
        config: ReactorConfig,
    ) -> Arc<Self> {
        let context = Arc::new(SweepContext {
            member,
            scheduler,
            store,
            segmenter,
            config,
        });
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let slot: SweepSlot = Arc::new(Mutex::new(None));

        let worker = tokio::spawn(run_worker(
            Arc::clone(&context),
            receiver,
            shutdown.clone(),
            Arc::clone(&slot),
        ));

        let reactor = Arc::new(Self {
            context,
            events: Arc::clone(&events),
            listener: Mutex::new(None),
            jobs: Mutex::new(Some(sender)),
            slot,
            shutdown,
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        });

        let listener = events.register(Arc::new(ReactorListener(Arc::downgrade(&reactor))));
        *lock(&reactor.listener) = Some(listener);

        tracing::info!(
            member = %reactor.context.member,
            mode = %reactor.context.config.metadata_mode,
            "topology reactor started"
        );
        reactor
    }

    /// Member this reactor serves
    pub fn member(&self) -> &Member {
        &self.context.member
    }

    /// Most recent schedule sweep that has not completed
    pub fn current_sweep(&self) -> Option<SweepHandle> {
        lock(&self.slot).clone()
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn handle(&self, event: &TopologyChangeEvent) {
        if self.is_closed() {
            return;
        }
        match event.phase {
            ChangePhase::Pre => {
                let lost = event.lost();
                if !lost.is_empty() {
                    self.supersede();
                    self.cancel_segments(&lost).await;
                }
            }
            ChangePhase::Post => self.submit_schedule_sweep(event),
        }
    }

    /// Cancel the in-flight schedule sweep, if any
    fn supersede(&self) {
        if let Some(handle) = lock(&self.slot).as_ref() {
            cancel_displaced(handle);
        }
    }

    /// Cancel local entries in `lost`, bounded by the configured deadline
    ///
    /// Yields to the runtime every `yield_every` entries.
    pub async fn cancel_segments(&self, lost: &SegmentSet) -> SweepReport {
        let deadline = Instant::now() + self.context.config.cancel_sweep_timeout;
        self.context.cancel_segments(lost, deadline, &self.shutdown).await
    }

    fn submit_schedule_sweep(&self, event: &TopologyChangeEvent) {
        let segments = event.gained();

        let mut slot = lock(&self.slot);
        if let Some(previous) = slot.take() {
            cancel_displaced(&previous);
        }

        if segments.is_empty() {
            return;
        }

        let (job, handle) = SweepJob::new(event.topology_id, segments);
        let sent = lock(&self.jobs)
            .as_ref()
            .is_some_and(|jobs| jobs.send(job).is_ok());
        if !sent {
            tracing::debug!(member = %self.context.member, "sweep worker gone; schedule sweep dropped");
            return;
        }

        tracing::debug!(
            member = %self.context.member,
            topology_id = event.topology_id,
            segments = handle.segments().len(),
            sweep = %handle.id(),
            "schedule sweep submitted"
        );
        *slot = Some(handle);
    }

    /// Unsubscribe, stop the worker and wait for it within the shutdown bound
    ///
    /// Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let listener = lock(&self.listener).take();
        if let Some(id) = listener {
            self.events.unregister(id);
        }

        self.shutdown.cancel();
        if let Some(handle) = lock(&self.slot).take() {
            handle.cancel();
        }
        lock(&self.jobs).take();

        let worker = lock(&self.worker).take();
        if let Some(mut worker) = worker {
            let timeout = self.context.config.shutdown_timeout;
            if tokio::time::timeout(timeout, &mut worker).await.is_err() {
                tracing::warn!(
                    member = %self.context.member,
                    timeout_ms = timeout.as_millis() as u64,
                    "sweep worker did not stop in time; aborting"
                );
                worker.abort();
            }
        }

        tracing::info!(member = %self.context.member, "topology reactor closed");
    }
}

fn cancel_displaced(handle: &SweepHandle) {
    if handle.is_cancelled() {
        return;
    }
    handle.cancel();
    if !handle.status().is_terminal() {
        metrics::record_superseded();
        tracing::debug!(sweep = %handle.id(), topology_id = handle.topology_id(), "schedule sweep superseded");
    }
}

impl<I, M> std::fmt::Debug for TopologyChangeReactor<I, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyChangeReactor")
            .field("member", &self.context.member)
            .field("config", &self.context.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
