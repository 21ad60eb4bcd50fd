//! Time-windowed status derivation.
//!
//! The timing window of a check opens `base_interval_minutes` before its due
//! time. Elapsed time since the window opened selects the display status:
//!
//! ```text
//! window start                                         due_at
//!     |--- early ---|-- pending --|- due-soon -|-- due --|--- late --->
//!     0            7 min        11 min       13 min    interval
//! ```
//!
//! Windows are half-open on the lower bound. The late threshold is always
//! `now >= due_at`, which is also the sweeper's miss threshold.

use crate::checks::types::{Check, CheckKind, CheckStatus, Timestamp};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Minute offsets (from window start) at which each timing window begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusWindows {
    pub pending_after_minutes: u32,
    pub due_soon_after_minutes: u32,
    pub due_after_minutes: u32,
}

impl Default for StatusWindows {
    fn default() -> Self {
        Self {
            pending_after_minutes: 7,
            due_soon_after_minutes: 11,
            due_after_minutes: 13,
        }
    }
}

impl StatusWindows {
    /// Returns `true` when the thresholds are strictly increasing.
    pub fn is_ordered(&self) -> bool {
        self.pending_after_minutes < self.due_soon_after_minutes
            && self.due_soon_after_minutes < self.due_after_minutes
    }

    /// Derive the timing status for a window ending at `due_at`.
    pub fn derive_at(
        &self,
        due_at: Timestamp,
        base_interval_minutes: u32,
        now: Timestamp,
    ) -> CheckStatus {
        if now >= due_at {
            return CheckStatus::Late;
        }

        let interval = i64::from(base_interval_minutes);
        let elapsed = now - (due_at - Duration::minutes(interval));
        // Thresholds past the interval are unreachable; clamping keeps them ordered.
        let threshold = |minutes: u32| Duration::minutes(i64::from(minutes).min(interval));

        if elapsed >= threshold(self.due_after_minutes) {
            CheckStatus::Due
        } else if elapsed >= threshold(self.due_soon_after_minutes) {
            CheckStatus::DueSoon
        } else if elapsed >= threshold(self.pending_after_minutes) {
            CheckStatus::Pending
        } else {
            CheckStatus::Early
        }
    }

    /// Derive the timing status of `check` at `now`.
    pub fn derive(&self, check: &Check, now: Timestamp) -> CheckStatus {
        self.derive_at(check.due_at, check.base_interval_minutes, now)
    }

    /// Status a view should render for `check` at `now`.
    ///
    /// Timing statuses are recomputed; command-owned statuses are returned as
    /// stored. Supplemental records always render as `supplemental`.
    pub fn display(&self, check: &Check, now: Timestamp) -> CheckStatus {
        if check.kind == CheckKind::Supplemental {
            return CheckStatus::Supplemental;
        }
        if check.status.is_timing() {
            self.derive(check, now)
        } else {
            check.status
        }
    }
}

/// Derive the timing status of `check` with the default windows.
pub fn derive_status(check: &Check, now: Timestamp) -> CheckStatus {
    StatusWindows::default().derive(check, now)
}

/// Display status of `check` with the default windows.
pub fn display_status(check: &Check, now: Timestamp) -> CheckStatus {
    StatusWindows::default().display(check, now)
}
