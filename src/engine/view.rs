//! Read-only snapshots of engine state for views.

use crate::checks::{Check, CheckStatus, Timestamp};
use crate::engine::connection::ConnectionState;
use serde::Serialize;

/// A live check with its status computed for the snapshot instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveCheck {
    #[serde(flatten)]
    pub check: Check,
    pub display_status: CheckStatus,
}

/// Everything a view needs to render the round at one instant.
///
/// Ordering of `live` follows the collection; sorting is the view's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineView {
    pub at: Timestamp,
    pub live: Vec<LiveCheck>,
    pub queued_count: usize,
    pub late_count: usize,
    pub connection: ConnectionState,
    pub epoch: u64,
}

impl EngineView {
    pub fn find(&self, check_id: &str) -> Option<&LiveCheck> {
        self.live.iter().find(|live| live.check.id == check_id)
    }

    pub fn find_slot(&self, slot_id: &str) -> Option<&LiveCheck> {
        self.live.iter().find(|live| live.check.slot_id == slot_id)
    }
}
