//! Real-time playback pacing.
//!
//! Each frame has a deadline: the sum of the delays of every frame
//! before it, measured from when the first frame was paced. Waiting is
//! computed against that deadline rather than accumulated per frame, so
//! processing time and sleep overshoot do not drift the schedule. A
//! frame that is already late is released immediately.

use std::time::Duration;

use sheetcount_pipeline::Clock;

/// Schedules frames against their declared display times.
pub struct Pacer<C: Clock> {
    clock: C,
    origin: Option<C::Instant>,
    next_due: Duration,
}

impl<C: Clock> Pacer<C> {
    /// Create a pacer. The schedule starts on the first call to
    /// [`wait_time`](Self::wait_time).
    pub const fn new(clock: C) -> Self {
        Self {
            clock,
            origin: None,
            next_due: Duration::ZERO,
        }
    }

    /// How long to wait before presenting the next frame, whose display
    /// time is `delay`.
    ///
    /// Advances the schedule by `delay`.
    pub fn wait_time(&mut self, delay: Duration) -> Duration {
        let due = self.next_due;
        self.next_due = self.next_due.saturating_add(delay);
        if self.origin.is_none() {
            self.origin = Some(self.clock.now());
            return Duration::ZERO;
        }
        let elapsed = self
            .origin
            .as_ref()
            .map_or(Duration::ZERO, |origin| self.clock.elapsed(origin));
        let wait = due.saturating_sub(elapsed);
        if wait.is_zero() && elapsed > due {
            tracing::trace!(behind_ms = (elapsed - due).as_secs_f64() * 1000.0, "frame late");
        }
        wait
    }

    /// Block until the next frame is due.
    pub fn pace(&mut self, delay: Duration) {
        let wait = self.wait_time(delay);
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    /// Clock whose time is set by the test.
    #[derive(Clone)]
    struct ManualClock(Rc<Cell<Duration>>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            self.0.set(self.0.get() + by);
        }
    }

    impl Clock for ManualClock {
        type Instant = Duration;

        fn now(&self) -> Duration {
            self.0.get()
        }

        fn elapsed(&self, since: &Duration) -> Duration {
            self.0.get().saturating_sub(*since)
        }
    }

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn first_frame_is_released_immediately() {
        let clock = ManualClock(Rc::new(Cell::new(Duration::from_secs(7))));
        let mut pacer = Pacer::new(clock);
        assert_eq!(pacer.wait_time(40 * MS), Duration::ZERO);
    }

    #[test]
    fn waits_account_for_processing_time() {
        let clock = ManualClock(Rc::new(Cell::new(Duration::ZERO)));
        let mut pacer = Pacer::new(clock.clone());
        pacer.wait_time(40 * MS);
        clock.advance(15 * MS);
        assert_eq!(pacer.wait_time(40 * MS), 25 * MS);
        clock.advance(25 * MS + 30 * MS);
        // Due at 80 ms, now at 70 ms.
        assert_eq!(pacer.wait_time(40 * MS), 10 * MS);
    }

    #[test]
    fn late_frames_do_not_drift_the_schedule() {
        let clock = ManualClock(Rc::new(Cell::new(Duration::ZERO)));
        let mut pacer = Pacer::new(clock.clone());
        pacer.wait_time(40 * MS);
        clock.advance(100 * MS);
        // Due at 40 ms, already late.
        assert_eq!(pacer.wait_time(40 * MS), Duration::ZERO);
        // Due at 80 ms, still late.
        assert_eq!(pacer.wait_time(40 * MS), Duration::ZERO);
        // Due at 120 ms.
        assert_eq!(pacer.wait_time(40 * MS), 20 * MS);
    }

    #[test]
    fn zero_delays_never_wait() {
        let clock = ManualClock(Rc::new(Cell::new(Duration::ZERO)));
        let mut pacer = Pacer::new(clock);
        for _ in 0..5 {
            assert_eq!(pacer.wait_time(Duration::ZERO), Duration::ZERO);
        }
    }
}
