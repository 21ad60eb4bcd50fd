//! Check lifecycle engine: command handling, sweeping, connectivity and
//! completion choreography over a single-writer check collection.

pub mod choreographer;
pub mod command;
pub mod connection;
pub mod error;
pub mod handler;
pub mod sweeper;
pub mod view;

pub use choreographer::{CompletionPlan, CompletionRoute, DeferredAction, DeferredQueue};
pub use command::{Command, CommandKind, CommandOutcome, EngineEvent};
pub use connection::{ConnectionMachine, ConnectionState, Transition};
pub use error::CommandError;
pub use handler::{CommandResult, Engine, SyncTransport, TickReport};
pub use view::{EngineView, LiveCheck};
