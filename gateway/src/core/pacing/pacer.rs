use std::time::Duration;
use tokio::time::Instant;

/// Release-time bookkeeping for burst-delivered audio.
///
/// Each scheduled frame is released no earlier than the end of the
/// previous one, so after a reset the N-th frame is released at or after
/// `baseline + sum(durations of frames 1..N-1)`.
#[derive(Debug, Default, Clone)]
pub struct Pacer {
    next_release: Option<Instant>,
}

impl Pacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the release instant of a frame of `duration` arriving at `now`.
    pub fn schedule(&mut self, now: Instant, duration: Duration) -> Instant {
        let release = match self.next_release {
            Some(next) if next > now => next,
            _ => now,
        };
        self.next_release = Some(release + duration);
        release
    }

    /// Drop the baseline. The next frame is released immediately.
    pub fn reset(&mut self) {
        self.next_release = None;
    }

    /// Instant at which the previously scheduled audio finishes playing.
    pub fn next_release(&self) -> Option<Instant> {
        self.next_release
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(20);

    #[test]
    fn test_burst_is_spread_by_duration() {
        let mut pacer = Pacer::new();
        let t0 = Instant::now();

        // A burst of five frames all arriving at t0
        let releases: Vec<Instant> = (0..5).map(|_| pacer.schedule(t0, FRAME)).collect();
        for (n, release) in releases.iter().enumerate() {
            assert_eq!(*release, t0 + FRAME * n as u32);
        }
        assert_eq!(pacer.next_release(), Some(t0 + FRAME * 5));
    }

    #[test]
    fn test_late_frame_is_released_on_arrival() {
        let mut pacer = Pacer::new();
        let t0 = Instant::now();

        assert_eq!(pacer.schedule(t0, FRAME), t0);
        // Arrives after the previous frame finished
        let late = t0 + Duration::from_millis(50);
        assert_eq!(pacer.schedule(late, FRAME), late);
        assert_eq!(pacer.next_release(), Some(late + FRAME));
    }

    #[test]
    fn test_variable_durations_accumulate() {
        let mut pacer = Pacer::new();
        let t0 = Instant::now();
        let durations = [
            Duration::from_millis(10),
            Duration::from_millis(40),
            Duration::from_micros(13_333),
        ];

        let mut expected = t0;
        for duration in durations {
            assert_eq!(pacer.schedule(t0, duration), expected);
            expected += duration;
        }
    }

    #[test]
    fn test_reset_starts_new_baseline() {
        let mut pacer = Pacer::new();
        let t0 = Instant::now();
        pacer.schedule(t0, FRAME);
        pacer.schedule(t0, FRAME);

        pacer.reset();
        assert_eq!(pacer.next_release(), None);

        let t1 = t0 + Duration::from_millis(5);
        assert_eq!(pacer.schedule(t1, FRAME), t1);
        assert_eq!(pacer.schedule(t1, FRAME), t1 + FRAME);
    }
}
