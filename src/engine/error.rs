//! Rejection taxonomy for the command handler.
//!
//! Every rejection is returned synchronously and leaves engine state
//! untouched. The engine never retries on its own; retry is up to the caller.

use crate::checks::CheckStatus;

/// Errors returned when a command cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// No check (or location) with the given identifier exists.
    #[error("check not found: {check_id}")]
    NotFound {
        /// The identifier that was looked up.
        check_id: String,
    },

    /// Applying the command would violate a lifecycle invariant.
    #[error("invalid transition for {check_id}: {from} -> {attempted}")]
    InvalidTransition {
        /// The check the command targeted.
        check_id: String,
        /// Stored status at the time of the command.
        from: CheckStatus,
        /// Status the command tried to move to.
        attempted: CheckStatus,
    },

    /// A precondition outside the check itself was not met.
    #[error("precondition failed: {reason}")]
    PreconditionFailed {
        /// Why the command was refused.
        reason: String,
    },

    /// The sync transport reported a failure; the queue was kept intact.
    #[error("sync failed: {reason}")]
    SyncFailed {
        /// Transport-provided failure description.
        reason: String,
    },
}

impl CommandError {
    pub(crate) fn not_found(check_id: impl Into<String>) -> Self {
        Self::NotFound {
            check_id: check_id.into(),
        }
    }

    pub(crate) fn invalid(
        check_id: impl Into<String>,
        from: CheckStatus,
        attempted: CheckStatus,
    ) -> Self {
        Self::InvalidTransition {
            check_id: check_id.into(),
            from,
            attempted,
        }
    }

    pub(crate) fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            reason: reason.into(),
        }
    }
}
