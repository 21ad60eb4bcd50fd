//! Check records, status derivation, recurrence and seed data.
//!
//! Everything in this module is plain data or pure functions; mutation lives
//! in [`crate::engine`].

pub mod fixture;
pub mod recurrence;
pub mod status;
pub mod types;

pub use fixture::{Fixture, SlotSeed};
pub use recurrence::next_generation;
pub use status::{StatusWindows, derive_status, display_status};
pub use types::{
    Check, CheckKind, CheckStatus, CompletionPayload, ObservedState, QueueEntry, Resident,
    ResidentObservation, SpecialClassification, Timestamp, summarize,
};
