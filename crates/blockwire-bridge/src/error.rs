//! Error types for the processing bridge.
//!
//! Errors only leave configuration and state-transfer entry points. The
//! process calls never return one: contract violations on the audio thread
//! end in silence instead.

use thiserror::Error;

use crate::lifecycle::BridgeState;

/// Errors that can occur while configuring or driving a bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The operation is not allowed in the current lifecycle state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// State the bridge was in.
        state: BridgeState,
    },
    /// The configuration is out of bounds.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Saving or restoring processor state failed.
    #[error("State error: {0}")]
    State(String),
    /// The configuration could not be parsed.
    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = BridgeError::InvalidState {
            operation: "change the sample rate",
            state: BridgeState::Processing,
        };
        assert_eq!(err.to_string(), "Cannot change the sample rate while processing");

        let err = BridgeError::State("expected 4 bytes".into());
        assert_eq!(err.to_string(), "State error: expected 4 bytes");
    }
}
