//! Rounds: check lifecycle and reconciliation engine for supervised rounds.
//!
//! A round is a set of recurring scheduled checks, one per location slot,
//! each with a due time. The engine keeps the round consistent under three
//! concurrent sources of mutation:
//!
//! - **Clock**: statuses age through their timing windows and overdue checks
//!   are missed by the sweeper, spawning the next generation.
//! - **User actions**: scans and forms complete checks, online through a
//!   short completing hold, offline through a FIFO queue.
//! - **Connectivity**: restoring the connection replays the queue.
//!
//! All mutation goes through [`Engine::apply`]; [`runtime`] runs an engine on
//! a tokio task and exposes it through an [`runtime::EngineHandle`].

pub mod checks;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod runtime;

pub use checks::{Check, CheckKind, CheckStatus, Fixture, StatusWindows, Timestamp};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RoundsConfig;
pub use engine::{Command, CommandError, CommandOutcome, Engine, EngineEvent, EngineView};
pub use error::{Result, RoundsError};
pub use runtime::{EngineHandle, spawn};
