use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Abstracts wall-clock/monotonic time so collector ticks can be scripted
/// to exact deltas in tests instead of depending on real elapsed time.
pub trait Clock {
    fn now_wall(&self) -> f64;
    fn now_monotonic(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealClock;

impl Clock for RealClock {
    fn now_wall(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// A scripted clock for tests: each call to `now_wall` returns the next
/// value from a fixed sequence (or repeats the last one once exhausted).
#[derive(Debug, Clone)]
pub struct MockClock {
    ticks: Vec<f64>,
    index: std::cell::Cell<usize>,
    monotonic_base: Instant,
}

impl MockClock {
    pub fn new(ticks: Vec<f64>) -> Self {
        Self {
            ticks,
            index: std::cell::Cell::new(0),
            monotonic_base: Instant::now(),
        }
    }
}

impl Clock for MockClock {
    fn now_wall(&self) -> f64 {
        let i = self.index.get();
        let value = self
            .ticks
            .get(i)
            .or_else(|| self.ticks.last())
            .copied()
            .unwrap_or(0.0);
        if i + 1 < self.ticks.len() {
            self.index.set(i + 1);
        }
        value
    }

    fn now_monotonic(&self) -> Instant {
        self.monotonic_base
    }
}
