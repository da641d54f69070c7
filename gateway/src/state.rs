use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use crate::config::ServerConfig;

/// Returned when the server is already running its maximum number of
/// bridge sessions.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Bridge session limit reached ({limit})")]
pub struct SessionLimitError {
    pub limit: usize,
}

/// Application state shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    active_sessions: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of bridge sessions currently holding a slot.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Acquire)
    }

    /// Reserve a bridge session slot.
    ///
    /// The slot is released when the returned guard is dropped.
    pub fn try_acquire_session(&self) -> Result<SessionSlot, SessionLimitError> {
        let limit = self.config.max_bridge_sessions;
        self.active_sessions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < limit).then_some(current + 1)
            })
            .map_err(|_| SessionLimitError { limit })?;

        Ok(SessionSlot {
            active_sessions: self.active_sessions.clone(),
        })
    }
}

/// Held for the lifetime of one bridge session.
#[derive(Debug)]
pub struct SessionSlot {
    active_sessions: Arc<AtomicUsize>,
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.active_sessions.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn state_with_limit(limit: usize) -> Arc<AppState> {
        unsafe {
            std::env::remove_var("MAX_BRIDGE_SESSIONS");
            std::env::remove_var("PEER_SAMPLE_RATE");
            std::env::remove_var("PEER_CHANNELS");
            std::env::remove_var("PORT");
        }
        let mut config = ServerConfig::from_env().unwrap();
        config.max_bridge_sessions = limit;
        AppState::new(config)
    }

    #[test]
    #[serial]
    fn test_session_slots_respect_limit() {
        let state = state_with_limit(2);

        let first = state.try_acquire_session().unwrap();
        let _second = state.try_acquire_session().unwrap();
        assert_eq!(state.active_sessions(), 2);
        assert_eq!(
            state.try_acquire_session().unwrap_err(),
            SessionLimitError { limit: 2 }
        );

        drop(first);
        assert_eq!(state.active_sessions(), 1);
        assert!(state.try_acquire_session().is_ok());
    }
}
