//! Error types for the rounds engine.

use crate::engine::error::CommandError;

/// Top-level error type for the check lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum RoundsError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Seed fixture could not be loaded or is inconsistent.
    #[error("fixture error: {0}")]
    Fixture(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error between the runtime and its handle.
    #[error("channel error: {0}")]
    Channel(String),

    /// A command was rejected by the command handler.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RoundsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config() {
        let err = RoundsError::Config("tick_interval_ms must be > 0".into());
        assert_eq!(err.to_string(), "config error: tick_interval_ms must be > 0");
    }

    #[test]
    fn command_error_is_transparent() {
        let err = RoundsError::from(CommandError::NotFound {
            check_id: "C1-g0".into(),
        });
        assert_eq!(err.to_string(), "check not found: C1-g0");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RoundsError>();
    }
}
