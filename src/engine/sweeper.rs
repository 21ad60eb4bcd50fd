//! Lifecycle sweeper.
//!
//! Runs once per clock tick over a snapshot of the collection and proposes
//! `Miss` commands for scheduled checks whose due time has passed. There is
//! no grace period. Re-proposing a miss for a check that is already missed is
//! harmless: the handler rejects it without changing state.

use crate::checks::{Check, CheckStatus, Timestamp};
use crate::engine::command::Command;

/// Returns `true` if the sweeper may miss `check`.
///
/// Terminal and queued checks are skipped, as are checks in the completing
/// hold, which must resolve to complete.
pub fn is_sweepable(check: &Check) -> bool {
    check.is_scheduled()
        && !check.is_terminal()
        && !matches!(check.status, CheckStatus::Queued | CheckStatus::Completing)
}

/// Propose a `Miss` for every sweepable check due at or before `now`.
pub fn sweep(checks: &[Check], now: Timestamp) -> Vec<Command> {
    checks
        .iter()
        .filter(|check| is_sweepable(check) && now >= check.due_at)
        .map(|check| Command::Miss {
            check_id: check.id.clone(),
            missed_at: now,
        })
        .collect()
}
