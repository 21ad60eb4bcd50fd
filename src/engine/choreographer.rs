//! Two-phase completion choreography.
//!
//! Online, a completion first enters the `completing` hold. After the hold
//! window the check is hidden from the live list, and after a further commit
//! window `Complete` is issued. Both later steps are deferred commands that
//! carry the store epoch and the target generation; the handler validates
//! them when they fire, so a `Reset` or any other supersession in between
//! turns them into no-ops instead of requiring cancellation bookkeeping.

use crate::checks::{ResidentObservation, Timestamp};
use crate::config::ChoreographyConfig;
use chrono::Duration;

/// Step to perform when a deferred command fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredAction {
    /// Hold elapsed: drop the check from the live list.
    Hide,
    /// Commit the completion.
    Commit {
        statuses: Vec<ResidentObservation>,
        notes: Option<String>,
    },
}

/// The check generation a deferred command was scheduled against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredTarget {
    /// Store epoch at scheduling time; bumped by `Reset`.
    pub epoch: u64,
    pub check_id: String,
    pub generation_id: u64,
}

/// A command scheduled for a future instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredCommand {
    pub fire_at: Timestamp,
    pub target: DeferredTarget,
    pub action: DeferredAction,
    seq: u64,
}

/// Pending deferred commands, fired in `(fire_at, scheduling order)` order.
#[derive(Debug, Clone, Default)]
pub struct DeferredQueue {
    pending: Vec<DeferredCommand>,
    next_seq: u64,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest pending fire time.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.pending.iter().map(|d| d.fire_at).min()
    }

    fn push(&mut self, fire_at: Timestamp, target: DeferredTarget, action: DeferredAction) {
        self.pending.push(DeferredCommand {
            fire_at,
            target,
            action,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    /// Remove and return every command due at or before `now`, in firing order.
    pub fn take_due(&mut self, now: Timestamp) -> Vec<DeferredCommand> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|d| d.fire_at <= now);
        self.pending = rest;
        due.sort_by_key(|d| (d.fire_at, d.seq));
        due
    }
}

/// Timing of the completing hold and the commit that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPlan {
    pub hold: Duration,
    pub commit_after_hold: Duration,
}

impl CompletionPlan {
    pub fn from_config(config: &ChoreographyConfig) -> Self {
        Self {
            hold: Duration::milliseconds(saturating_ms(config.hold_ms)),
            commit_after_hold: Duration::milliseconds(saturating_ms(config.commit_after_hold_ms)),
        }
    }

    /// Total delay between `SetCompleting` and `Complete`.
    pub fn commit_delay(&self) -> Duration {
        self.hold + self.commit_after_hold
    }

    /// Schedule the hide and commit steps for a check entering the hold at `now`.
    ///
    /// Returns the instant the commit will fire.
    pub fn schedule(
        &self,
        queue: &mut DeferredQueue,
        target: DeferredTarget,
        statuses: Vec<ResidentObservation>,
        notes: Option<String>,
        now: Timestamp,
    ) -> Timestamp {
        let commit_at = now + self.commit_delay();
        queue.push(now + self.hold, target.clone(), DeferredAction::Hide);
        queue.push(commit_at, target, DeferredAction::Commit { statuses, notes });
        commit_at
    }
}

impl Default for CompletionPlan {
    fn default() -> Self {
        Self::from_config(&ChoreographyConfig::default())
    }
}

pub(crate) fn saturating_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX / 1_000_000)
}

/// How a completion intent was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionRoute {
    /// Offline: recorded in the queue for the next sync.
    Queued,
    /// Online: in the completing hold; `Complete` fires at `commit_at`.
    Completing { commit_at: Timestamp },
}
