//! Seed fixture for the in-memory check collection.
//!
//! The roster and slot layout are reference data owned outside the engine.
//! A fixture describes them declaratively; [`Fixture::build_checks`] turns it
//! into generation-zero checks due relative to the seed time. `Reset` reseeds
//! from the same fixture.

use crate::checks::status::StatusWindows;
use crate::checks::types::{
    Check, CheckKind, Resident, SpecialClassification, Timestamp, scheduled_check_id,
};
use crate::error::{Result, RoundsError};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Layout of one recurring check slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSeed {
    pub slot_id: String,
    pub location_id: String,
    pub walking_order_index: u32,
    #[serde(default = "default_interval_minutes")]
    pub base_interval_minutes: u32,
    /// Minutes from seed time until the first generation is due.
    pub due_in_minutes: i64,
    #[serde(default)]
    pub special_classifications: Vec<SpecialClassification>,
}

/// Largest accepted first-due offset, either direction (one year).
const MAX_DUE_OFFSET_MINUTES: i64 = 525_600;

fn default_interval_minutes() -> u32 {
    15
}

/// Declarative seed data: roster plus slot layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub residents: Vec<Resident>,
    pub slots: Vec<SlotSeed>,
}

impl Fixture {
    /// Built-in demo unit used when no fixture file is configured.
    pub fn builtin() -> Self {
        let resident = |id: &str, name: &str, location: &str| Resident {
            id: id.to_owned(),
            name: name.to_owned(),
            location: location.to_owned(),
        };
        let slot = |slot_id: &str, location_id: &str, order: u32, due_in: i64| SlotSeed {
            slot_id: slot_id.to_owned(),
            location_id: location_id.to_owned(),
            walking_order_index: order,
            base_interval_minutes: default_interval_minutes(),
            due_in_minutes: due_in,
            special_classifications: Vec::new(),
        };

        let mut first = slot("C1", "B1-101", 0, 15);
        first.special_classifications.push(SpecialClassification {
            resident_id: "r-1002".to_owned(),
            kind: "suicide-watch".to_owned(),
            details: "constant observation ordered".to_owned(),
        });
        let mut third = slot("C3", "B1-103", 2, 9);
        third.special_classifications.push(SpecialClassification {
            resident_id: "r-1004".to_owned(),
            kind: "medical".to_owned(),
            details: "seizure history".to_owned(),
        });

        Self {
            residents: vec![
                resident("r-1001", "Avery Cole", "B1-101"),
                resident("r-1002", "Jordan Reyes", "B1-101"),
                resident("r-1003", "Sam Okafor", "B1-102"),
                resident("r-1004", "Riley Chen", "B1-103"),
                resident("r-1005", "Morgan Diaz", "B1-103"),
                resident("r-1006", "Casey Walsh", "B1-104"),
            ],
            slots: vec![
                first,
                slot("C2", "B1-102", 1, 12),
                third,
                slot("C4", "B1-104", 3, 20),
            ],
        }
    }

    /// Load a fixture from a JSON file and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`Fixture::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let fixture: Self = serde_json::from_slice(&bytes).map_err(|e| {
            RoundsError::Fixture(format!("cannot parse {}: {e}", path.display()))
        })?;
        fixture.validate()?;
        Ok(fixture)
    }

    /// Check slot identities and references.
    ///
    /// # Errors
    ///
    /// Returns [`RoundsError::Fixture`] on duplicate slot IDs, a zero base
    /// interval, a first-due offset beyond a year, or a classification naming
    /// a resident not on the roster.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for slot in &self.slots {
            if !seen.insert(slot.slot_id.as_str()) {
                return Err(RoundsError::Fixture(format!(
                    "duplicate slot id: {}",
                    slot.slot_id
                )));
            }
            if slot.base_interval_minutes == 0 {
                return Err(RoundsError::Fixture(format!(
                    "slot {} has a zero base interval",
                    slot.slot_id
                )));
            }
            let offsets = -MAX_DUE_OFFSET_MINUTES..=MAX_DUE_OFFSET_MINUTES;
            if !offsets.contains(&slot.due_in_minutes) {
                return Err(RoundsError::Fixture(format!(
                    "slot {} due offset {} is outside +/-{MAX_DUE_OFFSET_MINUTES} minutes",
                    slot.slot_id, slot.due_in_minutes
                )));
            }
            for classification in &slot.special_classifications {
                if !self.residents.iter().any(|r| r.id == classification.resident_id) {
                    return Err(RoundsError::Fixture(format!(
                        "slot {} classifies unknown resident {}",
                        slot.slot_id, classification.resident_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Residents assigned to `location_id`, in roster order.
    pub fn residents_at(&self, location_id: &str) -> Vec<Resident> {
        self.residents
            .iter()
            .filter(|r| r.location == location_id)
            .cloned()
            .collect()
    }

    /// Returns `true` if any resident or slot uses `location_id`.
    pub fn knows_location(&self, location_id: &str) -> bool {
        self.residents.iter().any(|r| r.location == location_id)
            || self.slots.iter().any(|s| s.location_id == location_id)
    }

    /// Build generation-zero checks for every slot, due relative to `now`.
    pub fn build_checks(&self, now: Timestamp, windows: &StatusWindows) -> Vec<Check> {
        self.slots
            .iter()
            .map(|slot| {
                let due_at = now + Duration::minutes(slot.due_in_minutes);
                Check {
                    id: scheduled_check_id(&slot.slot_id, 0),
                    slot_id: slot.slot_id.clone(),
                    location_id: slot.location_id.clone(),
                    kind: CheckKind::Scheduled,
                    residents: self.residents_at(&slot.location_id),
                    status: windows.derive_at(due_at, slot.base_interval_minutes, now),
                    due_at,
                    walking_order_index: slot.walking_order_index,
                    special_classifications: slot.special_classifications.clone(),
                    generation_id: 0,
                    base_interval_minutes: slot.base_interval_minutes,
                    last_checked_at: None,
                    completion_status: None,
                    notes: None,
                    incident_type: None,
                    hidden: false,
                }
            })
            .collect()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::builtin()
    }
}
