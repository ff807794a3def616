//! Cluster-aware task scheduling
//!
//! Tasks are keyed; a key's task must run on exactly the member that owns
//! the key's segment. Callers use a [`Scheduler`] without knowing where the
//! owner is: [`PrimaryOwnerScheduler`] resolves the owner, wraps the
//! operation in a [`Command`] and dispatches it.
//!
//! # Architecture
//!
//! ```text
//!  caller
//!    │ schedule / cancel / contains
//!    ▼
//! ┌───────────────────────┐ owner_of ┌──────────────────┐
//! │ PrimaryOwnerScheduler │─────────▶│ AffinityResolver │
//! └──────────┬────────────┘          └──────────────────┘
//!            │ Command (retried)
//!            ▼
//! ┌───────────────────────┐  local   ┌──────────────────┐
//! │   CommandDispatcher   │─────────▶│  LocalScheduler  │
//! └──────────┬────────────┘          └──────────────────┘
//!            │ remote: encoded command over the Transport
//!            ▼
//!     owner's LocalScheduler
//! ```
//!
//! # Modules
//!
//! - [`command`] - the command set and its wire shape
//! - [`dispatch`] - dispatcher trait, failure taxonomy, channel transport
//! - [`local`] - node-local scheduler and entry store boundaries
//! - [`primary`] - the primary-owner scheduler
//! - [`error`] - local scheduler errors

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

pub mod command;
pub mod dispatch;
pub mod error;
pub mod local;
pub mod primary;

pub use command::{Command, CommandOutput};
pub use dispatch::{
    ChannelDispatcher, CommandDispatcher, DispatchError, DispatchResult, FailureKind, Transport,
};
pub use error::{SchedulerError, SchedulerResult};
pub use local::{EntryStore, LocalScheduler, MemoryScheduler, MemoryStore, ScheduledTask};
pub use primary::PrimaryOwnerScheduler;

/// Bounds for task keys
pub trait Key:
    Clone + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> Key for T where
    T: Clone + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Bounds for task metadata
pub trait Metadata: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Metadata for T where T: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Cluster-wide scheduler contract
///
/// Operations never surface failures: `schedule`, `schedule_with` and
/// `cancel` log and return, `contains` reports `false`.
#[async_trait]
pub trait Scheduler<I: Key, M: Metadata>: Send + Sync {
    /// Schedule `id`; the owner looks up the current metadata
    async fn schedule(&self, id: &I);

    /// Schedule `id` with the given metadata
    async fn schedule_with(&self, id: &I, metadata: M);

    /// Cancel the task for `id`
    async fn cancel(&self, id: &I);

    /// Whether a task for `id` is scheduled on its owner
    async fn contains(&self, id: &I) -> bool;

    /// Release resources; later operations behave as cancelled
    fn close(&self);
}
