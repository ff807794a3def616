//! Primary-owner scheduler
//!
//! Routes every operation to the member that currently owns the key. The
//! owner is resolved again on each retry attempt, so a call that raced a
//! topology change follows the key to its new owner.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::command::{Command, CommandOutput};
use super::dispatch::{CommandDispatcher, DispatchError, DispatchResult, FailureKind};
use super::{Key, Metadata, Scheduler};
use crate::cluster::{AffinityResolver, Member};
use crate::metrics;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Scheduler that executes each operation on the key's primary owner
pub struct PrimaryOwnerScheduler<I, M> {
    affinity: Arc<dyn AffinityResolver<I>>,
    dispatcher: Arc<dyn CommandDispatcher<I, M>>,
    retry: RetryConfig,
    closed: AtomicBool,
}

impl<I: Key, M: Metadata> PrimaryOwnerScheduler<I, M> {
    /// Create a scheduler
    pub fn new(
        affinity: Arc<dyn AffinityResolver<I>>,
        dispatcher: Arc<dyn CommandDispatcher<I, M>>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            affinity,
            dispatcher,
            retry,
            closed: AtomicBool::new(false),
        }
    }

    /// Member the dispatcher runs on
    pub fn local_member(&self) -> &Member {
        self.dispatcher.local_member()
    }

    /// Retry policy applied to each dispatch
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Whether [`close`](Scheduler::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Ids scheduled on `member`
    ///
    /// The target is explicit, so the call is not retried elsewhere.
    pub async fn entries_on(&self, member: &Member) -> DispatchResult<Vec<I>> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        match self.dispatcher.dispatch(Command::ListEntries, member).await? {
            CommandOutput::Entries(entries) => Ok(entries),
            _ => Err(DispatchError::UnexpectedOutput {
                command: "list_entries",
            }),
        }
    }

    async fn dispatch_to_owner(&self, command: Command<I, M>) -> DispatchResult<CommandOutput<I>> {
        let name = command.name();
        if self.is_closed() {
            metrics::record_dispatch(name, FailureKind::Cancelled.as_str());
            return Err(DispatchError::Closed);
        }

        let attempts = AtomicU32::new(0);
        let result = with_retry_if(
            &self.retry,
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                let command = command.clone();
                async move {
                    let target = match command.key() {
                        Some(id) => self.affinity.owner_of(id),
                        None => self.dispatcher.local_member().clone(),
                    };
                    self.dispatcher.dispatch(command, &target).await
                }
            },
            DispatchError::is_retryable,
        )
        .await;

        metrics::record_retries(attempts.load(Ordering::Relaxed).saturating_sub(1));
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        metrics::record_dispatch(name, outcome);
        result
    }

    /// Dispatch a schedule or cancel, logging and swallowing any failure
    async fn submit(&self, id: &I, command: Command<I, M>) {
        let name = command.name();
        let Err(e) = self.dispatch_to_owner(command).await else {
            return;
        };

        match e.kind() {
            FailureKind::Cancelled => {
                debug!(command = name, id = ?id, error = %e, "dispatch cancelled");
            }
            FailureKind::Transient => {
                warn!(command = name, id = ?id, kind = %e.kind(), error = %e, "dispatch failed after retries");
            }
            FailureKind::LocalExecution => {
                error!(command = name, id = ?id, kind = %e.kind(), error = %e, "command execution failed");
            }
        }
    }
}

#[async_trait]
impl<I: Key, M: Metadata> Scheduler<I, M> for PrimaryOwnerScheduler<I, M> {
    async fn schedule(&self, id: &I) {
        self.submit(id, Command::schedule(id.clone())).await;
    }

    async fn schedule_with(&self, id: &I, metadata: M) {
        self.submit(id, Command::schedule_with(id.clone(), metadata)).await;
    }

    async fn cancel(&self, id: &I) {
        self.submit(id, Command::Cancel { id: id.clone() }).await;
    }

    async fn contains(&self, id: &I) -> bool {
        match self.dispatch_to_owner(Command::Contains { id: id.clone() }).await {
            Ok(CommandOutput::Contains(found)) => found,
            Ok(_) => {
                warn!(id = ?id, "unexpected output for contains");
                false
            }
            Err(e) if e.is_cancellation() => false,
            Err(e) => {
                warn!(id = ?id, kind = %e.kind(), error = %e, "contains failed; reporting absent");
                false
            }
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.dispatcher.close();
            debug!(member = %self.dispatcher.local_member(), "primary owner scheduler closed");
        }
    }
}
