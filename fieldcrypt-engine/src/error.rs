//! Engine error types.

use crate::state::State;
use thiserror::Error;

/// Result type for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by the native engine or by misuse of a context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine rejected an input or hit an internal fault.
    #[error("engine error {code}: {message}")]
    Status { code: i32, message: String },

    #[error("call not valid in state {0}")]
    InvalidState(State),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("engine handle is closed")]
    Closed,
}

impl EngineError {
    /// Builds a status error from the engine's code and message.
    pub fn status(code: i32, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }
}
