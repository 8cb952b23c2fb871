use std::time::{Duration, Instant};

/// Snapshot taken at the start of a composite cycle.
#[derive(Debug, Copy, Clone)]
pub struct CycleTime {
    /// Time since the previous cycle started.
    pub dt: Duration,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic cycle counter, starting at zero.
    pub cycle_index: u64,
}

/// Fixed-cadence deadline bookkeeping for the compositor.
///
/// The deadline is always one interval after the last tick, never after the
/// last deadline: a slow cycle delays the next one instead of causing a burst
/// of catch-up cycles.
#[derive(Debug, Clone)]
pub struct CyclePacer {
    interval: Duration,
    last: Instant,
    cycle_index: u64,
}

impl CyclePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
            cycle_index: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Instant by which the current cycle must run.
    pub fn deadline(&self) -> Instant {
        self.last + self.interval
    }

    /// Time left until [`deadline`](Self::deadline), zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    pub fn is_due(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    /// Starts a new cycle and returns its timing.
    pub fn tick(&mut self) -> CycleTime {
        let now = Instant::now();
        let time = CycleTime {
            dt: now.saturating_duration_since(self.last),
            now,
            cycle_index: self.cycle_index,
        };
        self.last = now;
        self.cycle_index = self.cycle_index.wrapping_add(1);
        time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn deadline_follows_last_tick() {
        let mut pacer = CyclePacer::new(Duration::from_millis(16));
        let first = pacer.tick();
        assert_eq!(first.cycle_index, 0);
        assert_eq!(pacer.deadline(), first.now + Duration::from_millis(16));
        assert!(!pacer.is_due());

        let second = pacer.tick();
        assert_eq!(second.cycle_index, 1);
        assert!(second.now >= first.now);
    }

    #[test]
    fn remaining_saturates_after_deadline() {
        let pacer = CyclePacer::new(Duration::from_millis(1));
        thread::sleep(Duration::from_millis(5));
        assert!(pacer.is_due());
        assert_eq!(pacer.remaining(), Duration::ZERO);
    }
}
