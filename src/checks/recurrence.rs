//! Next-occurrence generation for scheduled slots.

use crate::checks::status::StatusWindows;
use crate::checks::types::{Check, CheckKind, Timestamp, scheduled_check_id};

/// Build the successor generation of a terminated scheduled check.
///
/// Returns `None` for supplemental checks and for checks that have not
/// reached a terminal status. The successor is due one base interval after
/// its predecessor and starts with a freshly derived timing status.
pub fn next_generation(
    terminated: &Check,
    now: Timestamp,
    windows: &StatusWindows,
) -> Option<Check> {
    if terminated.kind != CheckKind::Scheduled || !terminated.is_terminal() {
        return None;
    }

    let due_at = terminated.due_at + terminated.base_interval();
    let generation_id = terminated.generation_id + 1;

    Some(Check {
        id: scheduled_check_id(&terminated.slot_id, generation_id),
        slot_id: terminated.slot_id.clone(),
        location_id: terminated.location_id.clone(),
        kind: CheckKind::Scheduled,
        residents: terminated.residents.clone(),
        status: windows.derive_at(due_at, terminated.base_interval_minutes, now),
        due_at,
        walking_order_index: terminated.walking_order_index,
        special_classifications: terminated.special_classifications.clone(),
        generation_id,
        base_interval_minutes: terminated.base_interval_minutes,
        last_checked_at: None,
        completion_status: None,
        notes: None,
        incident_type: None,
        hidden: false,
    })
}
