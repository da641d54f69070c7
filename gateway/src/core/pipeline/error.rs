//! Session error types.

use thiserror::Error;

use crate::core::bridge::BridgeError;
use crate::core::pacing::PacingError;
use crate::core::realtime::RealtimeError;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that end a bridging session or prevent it from starting.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session parameters are unusable; raised before any audio flows
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Speech service connection failed or dropped
    #[error("Transport error: {0}")]
    Transport(#[from] RealtimeError),

    /// Peer audio could not be converted
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Pacing stage rejected a frame
    #[error("Pacing error: {0}")]
    Pacing(#[from] PacingError),

    /// The peer went away before the session could start
    #[error("Peer closed")]
    PeerClosed,

    /// The session task was aborted
    #[error("Session cancelled")]
    Cancelled,

    /// A stage panicked or the runtime failed
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether this error was caused by invalid session parameters.
    pub fn is_configuration(&self) -> bool {
        match self {
            SessionError::Configuration(_) => true,
            SessionError::Transport(e) => e.is_configuration(),
            SessionError::Bridge(e) => e.is_configuration(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::AudioFormat;

    #[test]
    fn test_configuration_classification() {
        let err: SessionError =
            RealtimeError::InvalidConfiguration("API key is required".into()).into();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("API key is required"));

        let err: SessionError = BridgeError::FormatMismatch {
            expected: AudioFormat::opus(48000, 1),
            actual: AudioFormat::SPEECH,
        }
        .into();
        assert!(err.is_configuration());

        let err: SessionError = RealtimeError::ConnectionClosed("reset".into()).into();
        assert!(!err.is_configuration());
        assert!(!SessionError::PeerClosed.is_configuration());
    }
}
