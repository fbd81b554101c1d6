use hifitime::prelude::{Duration, Epoch};

/// Source of the current time. Loops and the RTK worker read time
/// through this so tests can drive them with a virtual clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> Epoch;
}

/// Wall clock (UTC).
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Epoch {
        // only fails when the system time predates 1970
        Epoch::now().unwrap_or_default()
    }
}

/// Fixed-interval ticker. Never fired ticker is always due.
#[derive(Debug, Copy, Clone)]
pub struct Ticker {
    period: Duration,
    last: Option<Epoch>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// True once strictly more than one period elapsed since the last mark.
    pub fn is_due(&self, now: Epoch) -> bool {
        match self.last {
            Some(last) => now - last > self.period,
            None => true,
        }
    }

    /// Marks the ticker as fired at `now`.
    pub fn mark(&mut self, now: Epoch) {
        self.last = Some(now);
    }
}
