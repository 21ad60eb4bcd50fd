//! Check records and the plain-data payloads that travel with commands.
//!
//! Defines the [`Check`] record, its [`CheckStatus`] lifecycle, resident
//! reference data and the completion payload recorded by staff.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock instant used throughout the engine.
pub type Timestamp = DateTime<Utc>;

/// Whether a check recurs on a schedule or was logged ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Part of the recurring round; re-scheduled after each generation ends.
    Scheduled,
    /// Logged outside the schedule; created complete and never recurs.
    Supplemental,
}

/// Lifecycle and display status of a check.
///
/// The first five variants are timing windows derived from the clock; the
/// rest are set by commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Early,
    Pending,
    DueSoon,
    Due,
    Late,
    Missed,
    Completing,
    Complete,
    Queued,
    Supplemental,
}

impl CheckStatus {
    /// `missed` and `complete` end a generation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Missed | Self::Complete)
    }

    /// Returns `true` for statuses produced by the status deriver.
    pub fn is_timing(self) -> bool {
        self.window_rank().is_some()
    }

    /// Position of a timing window, earliest first.
    pub fn window_rank(self) -> Option<u8> {
        match self {
            Self::Early => Some(0),
            Self::Pending => Some(1),
            Self::DueSoon => Some(2),
            Self::Due => Some(3),
            Self::Late => Some(4),
            _ => None,
        }
    }

    /// Stable lowercase label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Early => "early",
            Self::Pending => "pending",
            Self::DueSoon => "due-soon",
            Self::Due => "due",
            Self::Late => "late",
            Self::Missed => "missed",
            Self::Completing => "completing",
            Self::Complete => "complete",
            Self::Queued => "queued",
            Self::Supplemental => "supplemental",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Read-only roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    pub id: String,
    pub name: String,
    /// Location (room / cell) the resident is assigned to.
    pub location: String,
}

/// Risk or display metadata attached to a resident on a check.
///
/// Carried along for the view; it never influences transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialClassification {
    pub resident_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub details: String,
}

/// What staff observed about one resident during a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedState {
    Awake,
    Sleeping,
    Refused,
    NotPresent,
    NeedsAttention,
}

impl ObservedState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Awake => "awake",
            Self::Sleeping => "sleeping",
            Self::Refused => "refused",
            Self::NotPresent => "not present",
            Self::NeedsAttention => "needs attention",
        }
    }
}

/// Per-resident observation recorded on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentObservation {
    pub resident_id: String,
    pub state: ObservedState,
}

impl ResidentObservation {
    pub fn new(resident_id: impl Into<String>, state: ObservedState) -> Self {
        Self {
            resident_id: resident_id.into(),
            state,
        }
    }
}

/// Data captured when staff complete a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionPayload {
    /// Observations, in roster order.
    pub statuses: Vec<ResidentObservation>,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// When the completion was recorded on the device.
    pub completion_time: Timestamp,
}

/// A completion recorded while offline, waiting for the next sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub check_id: String,
    pub payload: CompletionPayload,
    /// When the entry was appended to the queue.
    pub queued_at: Timestamp,
}

/// One generation of a compliance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// Unique per generation (`{slot_id}-g{generation_id}` for scheduled checks).
    pub id: String,
    /// Identity shared by every generation of the same recurring check.
    pub slot_id: String,
    pub location_id: String,
    pub kind: CheckKind,
    pub residents: Vec<Resident>,
    /// Advisory cache; see [`crate::checks::status::display_status`].
    pub status: CheckStatus,
    pub due_at: Timestamp,
    pub walking_order_index: u32,
    #[serde(default)]
    pub special_classifications: Vec<SpecialClassification>,
    pub generation_id: u64,
    pub base_interval_minutes: u32,
    #[serde(default)]
    pub last_checked_at: Option<Timestamp>,
    #[serde(default)]
    pub completion_status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub incident_type: Option<String>,
    /// Set once the completing hold has elapsed; the live view drops hidden checks.
    #[serde(default)]
    pub hidden: bool,
}

impl Check {
    /// Start of the check's timing window (`due_at - base_interval`).
    pub fn window_start(&self) -> Timestamp {
        self.due_at - self.base_interval()
    }

    /// The base interval as a chrono duration.
    pub fn base_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.base_interval_minutes))
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_scheduled(&self) -> bool {
        self.kind == CheckKind::Scheduled
    }
}

/// Per-generation check identifier for a scheduled slot.
pub fn scheduled_check_id(slot_id: &str, generation_id: u64) -> String {
    format!("{slot_id}-g{generation_id}")
}

/// Collapse resident observations into a one-line completion summary.
///
/// A uniform set yields its single label (`"awake"`); mixed sets list counts
/// in first-seen order (`"2 awake, 1 sleeping"`).
pub fn summarize(statuses: &[ResidentObservation]) -> String {
    let mut counts: Vec<(ObservedState, usize)> = Vec::new();
    for observation in statuses {
        match counts.iter_mut().find(|(state, _)| *state == observation.state) {
            Some((_, count)) => *count += 1,
            None => counts.push((observation.state, 1)),
        }
    }

    match counts.as_slice() {
        [] => "no observations".to_owned(),
        [(state, _)] => state.label().to_owned(),
        many => many
            .iter()
            .map(|(state, count)| format!("{count} {}", state.label()))
            .collect::<Vec<_>>()
            .join(", "),
    }
}
