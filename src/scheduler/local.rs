//! Node-local scheduling boundary
//!
//! [`LocalScheduler`] is the per-node timer that actually holds scheduled
//! tasks; [`EntryStore`] is the node's locally held data, consulted when a
//! task must be (re)built from current state. Both must tolerate concurrent
//! calls. [`MemoryScheduler`] and [`MemoryStore`] are in-memory
//! implementations used by the cluster harness and tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use super::error::{SchedulerError, SchedulerResult};
use crate::utils::{lock, read_lock, write_lock};

/// Per-node task scheduler
pub trait LocalScheduler<I, M>: Send + Sync {
    /// Schedule `id`, looking up its current metadata locally
    ///
    /// Returns `Ok` without scheduling when the entry no longer exists.
    fn schedule(&self, id: &I) -> SchedulerResult<()>;

    /// Schedule `id` with the supplied metadata
    fn schedule_with(&self, id: &I, metadata: M) -> SchedulerResult<()>;

    /// Cancel the task for `id`; a no-op when nothing is scheduled
    fn cancel(&self, id: &I) -> SchedulerResult<()>;

    /// Whether a task is scheduled for `id`
    fn contains(&self, id: &I) -> SchedulerResult<bool>;

    /// Ids of every scheduled task
    fn entries(&self) -> SchedulerResult<Vec<I>>;
}

/// Locally held entries backing the scheduler
pub trait EntryStore<I, M>: Send + Sync {
    /// Keys of every locally held entry
    fn keys(&self) -> SchedulerResult<Vec<I>>;

    /// Current metadata of `id`, if the entry still exists
    ///
    /// A store that cannot be read returns [`SchedulerError::StoreUnavailable`].
    fn metadata(&self, id: &I) -> SchedulerResult<Option<M>>;
}

// ============================================================================
// Memory Store
// ============================================================================

/// Thread-safe in-memory entry store
#[derive(Debug)]
pub struct MemoryStore<I, M> {
    entries: RwLock<HashMap<I, M>>,
}

impl<I, M> Default for MemoryStore<I, M> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<I: Eq + Hash, M> MemoryStore<I, M> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn insert(&self, id: I, metadata: M) -> Option<M> {
        write_lock(&self.entries).insert(id, metadata)
    }

    /// Remove an entry
    pub fn remove(&self, id: &I) -> Option<M> {
        write_lock(&self.entries).remove(id)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        read_lock(&self.entries).len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<I, M> EntryStore<I, M> for MemoryStore<I, M>
where
    I: Clone + Eq + Hash + Send + Sync,
    M: Clone + Send + Sync,
{
    fn keys(&self) -> SchedulerResult<Vec<I>> {
        Ok(read_lock(&self.entries).keys().cloned().collect())
    }

    fn metadata(&self, id: &I) -> SchedulerResult<Option<M>> {
        Ok(read_lock(&self.entries).get(id).cloned())
    }
}

// ============================================================================
// Memory Scheduler
// ============================================================================

/// A task held by [`MemoryScheduler`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask<M> {
    /// Metadata the task was built from
    pub metadata: M,

    /// When the task was (re)scheduled
    pub scheduled_at: DateTime<Utc>,
}

/// In-memory local scheduler
///
/// Holds one task per id; rescheduling replaces the previous task. Transient
/// scheduling reads metadata from the entry store.
pub struct MemoryScheduler<I, M> {
    store: Arc<dyn EntryStore<I, M>>,
    tasks: Mutex<HashMap<I, ScheduledTask<M>>>,
    closed: AtomicBool,
}

impl<I, M> MemoryScheduler<I, M>
where
    I: Clone + Eq + Hash + Send + Sync,
    M: Clone + Send + Sync,
{
    /// Create a scheduler over `store`
    pub fn new(store: Arc<dyn EntryStore<I, M>>) -> Self {
        Self {
            store,
            tasks: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Task currently held for `id`
    pub fn task(&self, id: &I) -> Option<ScheduledTask<M>> {
        lock(&self.tasks).get(id).cloned()
    }

    /// Number of scheduled tasks
    pub fn len(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// Whether no task is scheduled
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every task and reject further operations
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            lock(&self.tasks).clear();
        }
    }

    fn ensure_open(&self) -> SchedulerResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }
        Ok(())
    }
}

impl<I, M> LocalScheduler<I, M> for MemoryScheduler<I, M>
where
    I: Clone + Eq + Hash + Send + Sync,
    M: Clone + Send + Sync,
{
    fn schedule(&self, id: &I) -> SchedulerResult<()> {
        self.ensure_open()?;
        match self.store.metadata(id)? {
            Some(metadata) => self.schedule_with(id, metadata),
            // Entry already removed; drop any stale task.
            None => {
                lock(&self.tasks).remove(id);
                Ok(())
            }
        }
    }

    fn schedule_with(&self, id: &I, metadata: M) -> SchedulerResult<()> {
        self.ensure_open()?;
        let task = ScheduledTask {
            metadata,
            scheduled_at: Utc::now(),
        };
        lock(&self.tasks).insert(id.clone(), task);
        Ok(())
    }

    fn cancel(&self, id: &I) -> SchedulerResult<()> {
        self.ensure_open()?;
        lock(&self.tasks).remove(id);
        Ok(())
    }

    fn contains(&self, id: &I) -> SchedulerResult<bool> {
        self.ensure_open()?;
        Ok(lock(&self.tasks).contains_key(id))
    }

    fn entries(&self) -> SchedulerResult<Vec<I>> {
        self.ensure_open()?;
        Ok(lock(&self.tasks).keys().cloned().collect())
    }
}
