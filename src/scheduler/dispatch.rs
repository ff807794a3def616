//! Location-transparent command dispatch
//!
//! A [`CommandDispatcher`] sends a [`Command`] to a [`Member`] and returns its
//! output. Commands addressed to the local member run in-process; others are
//! encoded to their wire shape and carried over the [`Transport`], an
//! in-process channel fabric standing in for the cluster RPC layer.
//!
//! Remote endpoints reject keyed commands for keys they do not own, so a
//! caller holding a stale owner gets [`DispatchError::NotOwner`] and can
//! resolve again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::command::{Command, CommandOutput};
use super::error::SchedulerError;
use super::local::LocalScheduler;
use super::{Key, Metadata};
use crate::cluster::{AffinityResolver, Member};
use crate::utils::{read_lock, write_lock};

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failure classes that drive retry and logging decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network, timeout or stale-owner failure; worth retrying
    Transient,
    /// The call was cancelled, usually by shutdown; benign
    Cancelled,
    /// The target ran the command and it failed, or the exchange was malformed
    LocalExecution,
}

impl FailureKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Cancelled => "cancelled",
            Self::LocalExecution => "execution",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while dispatching a command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The transport failed while talking to the member
    #[error("Transport failure talking to {member}: {reason}")]
    Transport { member: Member, reason: String },

    /// No endpoint is bound for the member
    #[error("Member {0} is unreachable")]
    Unreachable(Member),

    /// The member did not reply in time
    #[error("Dispatch to {member} timed out after {timeout_ms}ms")]
    Timeout { member: Member, timeout_ms: u64 },

    /// The member no longer owns the key
    #[error("Member {member} does not own the key")]
    NotOwner { member: Member },

    /// The in-flight call was cancelled
    #[error("Dispatch cancelled")]
    Cancelled,

    /// The dispatcher was closed
    #[error("Dispatcher is closed")]
    Closed,

    /// The target's local scheduler failed
    #[error("Local execution failed: {0}")]
    Execution(String),

    /// A command or reply could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// The reply did not match the command
    #[error("Unexpected output for '{command}'")]
    UnexpectedOutput { command: &'static str },
}

impl DispatchError {
    /// Failure class of this error
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport { .. }
            | Self::Unreachable(_)
            | Self::Timeout { .. }
            | Self::NotOwner { .. } => FailureKind::Transient,
            Self::Cancelled | Self::Closed => FailureKind::Cancelled,
            Self::Execution(_) | Self::Codec(_) | Self::UnexpectedOutput { .. } => {
                FailureKind::LocalExecution
            }
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    /// Whether the call was cancelled rather than failed
    pub fn is_cancellation(&self) -> bool {
        self.kind() == FailureKind::Cancelled
    }
}

impl From<SchedulerError> for DispatchError {
    fn from(err: SchedulerError) -> Self {
        Self::Execution(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Sends commands to members
#[async_trait]
pub trait CommandDispatcher<I: Key, M: Metadata>: Send + Sync {
    /// Member this dispatcher runs on
    fn local_member(&self) -> &Member;

    /// Execute `command` on `target`
    async fn dispatch(&self, command: Command<I, M>, target: &Member) -> DispatchResult<CommandOutput<I>>;

    /// Release the dispatcher; later dispatches fail with [`DispatchError::Closed`]
    fn close(&self);
}

// ============================================================================
// Transport
// ============================================================================

/// Reply carried back over the transport
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Reply<I> {
    Ok { output: CommandOutput<I> },
    NotOwner,
    Failed { reason: String },
    Malformed { reason: String },
}

struct Envelope {
    payload: Vec<u8>,
    reply: oneshot::Sender<Vec<u8>>,
}

struct Endpoint {
    sender: mpsc::Sender<Envelope>,
    token: CancellationToken,
}

/// In-process message fabric between members
///
/// Each bound member gets a bounded inbox served by its own task. Unbinding
/// stops the task; requests still queued are dropped and their callers see
/// [`DispatchError::Cancelled`].
pub struct Transport {
    endpoints: RwLock<HashMap<Member, Endpoint>>,
    capacity: usize,
}

impl Transport {
    /// Default inbox capacity per member
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Create a transport
    pub fn new() -> Arc<Self> {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a transport with a custom inbox capacity
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            endpoints: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        })
    }

    /// Serve commands for `member` against `scheduler`
    ///
    /// Replaces any endpoint previously bound for the member. Must be called
    /// from within a tokio runtime.
    pub fn bind<I: Key, M: Metadata>(
        &self,
        member: Member,
        scheduler: Arc<dyn LocalScheduler<I, M>>,
        affinity: Arc<dyn AffinityResolver<I>>,
    ) {
        let (sender, inbox) = mpsc::channel(self.capacity);
        let token = CancellationToken::new();
        tokio::spawn(serve(member.clone(), inbox, token.clone(), scheduler, affinity));

        let previous = write_lock(&self.endpoints).insert(member.clone(), Endpoint { sender, token });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        tracing::debug!(member = %member, "transport endpoint bound");
    }

    /// Stop serving `member`
    pub fn unbind(&self, member: &Member) -> bool {
        match write_lock(&self.endpoints).remove(member) {
            Some(endpoint) => {
                endpoint.token.cancel();
                tracing::debug!(member = %member, "transport endpoint unbound");
                true
            }
            None => false,
        }
    }

    /// Whether `member` has a bound endpoint
    pub fn is_bound(&self, member: &Member) -> bool {
        read_lock(&self.endpoints).contains_key(member)
    }

    fn sender(&self, member: &Member) -> Option<mpsc::Sender<Envelope>> {
        read_lock(&self.endpoints)
            .get(member)
            .map(|endpoint| endpoint.sender.clone())
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<_> = read_lock(&self.endpoints).keys().cloned().collect();
        f.debug_struct("Transport")
            .field("members", &members)
            .field("capacity", &self.capacity)
            .finish()
    }
}

async fn serve<I: Key, M: Metadata>(
    member: Member,
    mut inbox: mpsc::Receiver<Envelope>,
    token: CancellationToken,
    scheduler: Arc<dyn LocalScheduler<I, M>>,
    affinity: Arc<dyn AffinityResolver<I>>,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            envelope = inbox.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let reply = handle::<I, M>(&member, &envelope.payload, scheduler.as_ref(), affinity.as_ref());
        match serde_json::to_vec(&reply) {
            Ok(bytes) => {
                // Caller may have timed out and gone away.
                let _ = envelope.reply.send(bytes);
            }
            Err(e) => {
                tracing::warn!(member = %member, error = %e, "failed to encode reply");
            }
        }
    }
    tracing::debug!(member = %member, "transport endpoint stopped");
}

fn handle<I: Key, M: Metadata>(
    member: &Member,
    payload: &[u8],
    scheduler: &dyn LocalScheduler<I, M>,
    affinity: &dyn AffinityResolver<I>,
) -> Reply<I> {
    let command = match Command::<I, M>::decode(payload) {
        Ok(command) => command,
        Err(e) => {
            return Reply::Malformed {
                reason: e.to_string(),
            }
        }
    };

    if let Some(id) = command.key() {
        if affinity.owner_of(id) != *member {
            tracing::debug!(member = %member, command = command.name(), "rejecting command for key owned elsewhere");
            return Reply::NotOwner;
        }
    }

    match command.execute(scheduler) {
        Ok(output) => Reply::Ok { output },
        Err(e) => Reply::Failed {
            reason: e.to_string(),
        },
    }
}

// ============================================================================
// Channel Dispatcher
// ============================================================================

/// Dispatcher over a shared [`Transport`]
///
/// Binding the dispatcher also binds the member's endpoint; closing it
/// unbinds the endpoint.
pub struct ChannelDispatcher<I, M> {
    local: Member,
    scheduler: Arc<dyn LocalScheduler<I, M>>,
    transport: Arc<Transport>,
    rpc_timeout: Duration,
    closed: AtomicBool,
}

impl<I: Key, M: Metadata> ChannelDispatcher<I, M> {
    /// Bind `local` on `transport` and return its dispatcher
    pub fn bind(
        local: Member,
        scheduler: Arc<dyn LocalScheduler<I, M>>,
        affinity: Arc<dyn AffinityResolver<I>>,
        transport: Arc<Transport>,
        rpc_timeout: Duration,
    ) -> Self {
        transport.bind(local.clone(), Arc::clone(&scheduler), affinity);
        Self {
            local,
            scheduler,
            transport,
            rpc_timeout,
            closed: AtomicBool::new(false),
        }
    }

    async fn dispatch_remote(&self, command: Command<I, M>, target: &Member) -> DispatchResult<CommandOutput<I>> {
        let sender = self
            .transport
            .sender(target)
            .ok_or_else(|| DispatchError::Unreachable(target.clone()))?;

        let payload = command.encode()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        // The timeout covers waiting for inbox capacity as well as the reply.
        let exchange = async {
            sender
                .send(Envelope {
                    payload,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| DispatchError::Unreachable(target.clone()))?;
            reply_rx.await.map_err(|_| DispatchError::Cancelled)
        };

        let bytes = match tokio::time::timeout(self.rpc_timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DispatchError::Timeout {
                    member: target.clone(),
                    timeout_ms: self.rpc_timeout.as_millis() as u64,
                })
            }
        };

        match serde_json::from_slice::<Reply<I>>(&bytes)? {
            Reply::Ok { output } => Ok(output),
            Reply::NotOwner => Err(DispatchError::NotOwner {
                member: target.clone(),
            }),
            Reply::Failed { reason } => Err(DispatchError::Execution(reason)),
            Reply::Malformed { reason } => Err(DispatchError::Codec(reason)),
        }
    }
}

#[async_trait]
impl<I: Key, M: Metadata> CommandDispatcher<I, M> for ChannelDispatcher<I, M> {
    fn local_member(&self) -> &Member {
        &self.local
    }

    async fn dispatch(&self, command: Command<I, M>, target: &Member) -> DispatchResult<CommandOutput<I>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Closed);
        }

        if *target == self.local {
            return command.execute(self.scheduler.as_ref()).map_err(DispatchError::from);
        }

        self.dispatch_remote(command, target).await
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.transport.unbind(&self.local);
            tracing::debug!(member = %self.local, "dispatcher closed");
        }
    }
}
