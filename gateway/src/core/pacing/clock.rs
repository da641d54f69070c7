//! Time source for the pacing stage.

use async_trait::async_trait;
use tokio::time::Instant;

/// Source of "now" and of deadline sleeps.
///
/// The pacing stage reads time only through this trait, so tests can run
/// it against tokio's paused clock and production runs it against the
/// real one.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Wait until `deadline`. Returns immediately if it has passed.
    async fn sleep_until(&self, deadline: Instant);
}

/// Clock backed by `tokio::time`.
///
/// Under `#[tokio::test(start_paused = true)]` this clock is virtual and
/// auto-advances whenever the runtime is idle.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleeps_to_deadline() {
        let clock = TokioClock;
        let start = clock.now();
        clock.sleep_until(start + Duration::from_millis(250)).await;
        assert_eq!(clock.now() - start, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_deadline_returns_immediately() {
        let clock = TokioClock;
        let start = clock.now();
        clock.sleep_until(start - Duration::from_millis(5)).await;
        assert_eq!(clock.now(), start);
    }
}
