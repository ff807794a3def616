//! Scheduler commands
//!
//! A [`Command`] is a wire-transmissible instruction executed against exactly
//! one member's [`LocalScheduler`]. The set of variants is closed and matched
//! at the execution site.
//!
//! Wire shape (JSON, tagged by `type`):
//!
//! ```text
//! {"type":"schedule","id":"s-1","metadata":{...}}   persistent metadata
//! {"type":"schedule","id":"s-1"}                    transient: owner looks it up
//! {"type":"cancel","id":"s-1"}
//! {"type":"contains","id":"s-1"}
//! {"type":"list_entries"}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::SchedulerResult;
use super::local::LocalScheduler;

/// Instruction for a member's local scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command<I, M> {
    /// Schedule `id`; absent metadata means the owner looks up current state
    Schedule {
        id: I,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<M>,
    },

    /// Cancel the task for `id`
    Cancel { id: I },

    /// Ask whether `id` is scheduled
    Contains { id: I },

    /// List every locally scheduled id
    ListEntries,
}

/// Result of executing a [`Command`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CommandOutput<I> {
    /// Schedule or cancel completed
    Done,

    /// Answer to `Contains`
    Contains(bool),

    /// Answer to `ListEntries`
    Entries(Vec<I>),
}

impl<I, M> Command<I, M> {
    /// Schedule in transient metadata mode
    pub fn schedule(id: I) -> Self {
        Self::Schedule { id, metadata: None }
    }

    /// Schedule in persistent metadata mode
    pub fn schedule_with(id: I, metadata: M) -> Self {
        Self::Schedule {
            id,
            metadata: Some(metadata),
        }
    }

    /// Key the command targets, if any
    pub fn key(&self) -> Option<&I> {
        match self {
            Self::Schedule { id, .. } | Self::Cancel { id } | Self::Contains { id } => Some(id),
            Self::ListEntries => None,
        }
    }

    /// Stable name used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Schedule { .. } => "schedule",
            Self::Cancel { .. } => "cancel",
            Self::Contains { .. } => "contains",
            Self::ListEntries => "list_entries",
        }
    }

    /// Run the command against `scheduler`
    pub fn execute(self, scheduler: &dyn LocalScheduler<I, M>) -> SchedulerResult<CommandOutput<I>> {
        match self {
            Self::Schedule {
                id,
                metadata: Some(metadata),
            } => scheduler
                .schedule_with(&id, metadata)
                .map(|()| CommandOutput::Done),
            Self::Schedule { id, metadata: None } => {
                scheduler.schedule(&id).map(|()| CommandOutput::Done)
            }
            Self::Cancel { id } => scheduler.cancel(&id).map(|()| CommandOutput::Done),
            Self::Contains { id } => scheduler.contains(&id).map(CommandOutput::Contains),
            Self::ListEntries => scheduler.entries().map(CommandOutput::Entries),
        }
    }
}

impl<I: Serialize, M: Serialize> Command<I, M> {
    /// Encode to the wire shape
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<I: DeserializeOwned, M: DeserializeOwned> Command<I, M> {
    /// Decode from the wire shape
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
