//! Commands accepted by the handler and the events it reports.

use crate::checks::{CompletionPayload, Timestamp};
use crate::engine::connection::ConnectionState;
use crate::engine::error::CommandError;
use serde::{Deserialize, Serialize};

/// A mutation request. Every command is applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Record a completed check.
    Complete {
        check_id: String,
        payload: CompletionPayload,
    },
    /// Mark a check missed. Issued by the sweeper only.
    Miss {
        check_id: String,
        missed_at: Timestamp,
    },
    /// Log an ad-hoc check at a location; it is created already complete.
    AddSupplemental {
        location_id: String,
        payload: CompletionPayload,
        incident_type: String,
    },
    /// Enter the transient completing hold.
    SetCompleting { check_id: String },
    /// Record a completion while offline.
    SetQueued {
        check_id: String,
        payload: CompletionPayload,
    },
    /// Replay the offline queue as completions at `sync_time`.
    Sync { sync_time: Timestamp },
    /// Drop all checks and the queue, then reseed from the fixture.
    Reset { at: Timestamp },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Complete { .. } => CommandKind::Complete,
            Self::Miss { .. } => CommandKind::Miss,
            Self::AddSupplemental { .. } => CommandKind::AddSupplemental,
            Self::SetCompleting { .. } => CommandKind::SetCompleting,
            Self::SetQueued { .. } => CommandKind::SetQueued,
            Self::Sync { .. } => CommandKind::Sync,
            Self::Reset { .. } => CommandKind::Reset,
        }
    }
}

/// Discriminant of a [`Command`], used in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Complete,
    Miss,
    AddSupplemental,
    SetCompleting,
    SetQueued,
    Sync,
    Reset,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Complete => "complete",
            Self::Miss => "miss",
            Self::AddSupplemental => "add_supplemental",
            Self::SetCompleting => "set_completing",
            Self::SetQueued => "set_queued",
            Self::Sync => "sync",
            Self::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Result of a successfully applied command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Completed {
        check_id: String,
        /// Next generation created for scheduled checks.
        successor: Option<String>,
    },
    Missed {
        check_id: String,
        successor: Option<String>,
    },
    SupplementalAdded {
        check_id: String,
    },
    Completing {
        check_id: String,
    },
    Queued {
        check_id: String,
        queue_len: usize,
    },
    /// Queue entries replayed, in FIFO order.
    Synced {
        replayed: Vec<String>,
    },
    /// `Sync` with nothing queued; a deliberate no-op.
    EmptyQueue,
    Reset {
        seeded: usize,
    },
}

/// Something observable that happened inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A command was applied.
    Applied {
        command: CommandKind,
        outcome: CommandOutcome,
        at: Timestamp,
    },
    /// A command was rejected; state is unchanged.
    Rejected {
        command: CommandKind,
        error: CommandError,
        at: Timestamp,
    },
    /// The connection state machine moved.
    ConnectionChanged {
        from: ConnectionState,
        to: ConnectionState,
        at: Timestamp,
    },
    /// The completing hold elapsed; the check left the live list.
    CheckHidden { check_id: String, at: Timestamp },
    /// A deferred step found its target superseded and did nothing.
    DeferredSkipped {
        check_id: String,
        reason: String,
        at: Timestamp,
    },
}
