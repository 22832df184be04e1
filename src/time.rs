use std::time::Duration;

/// Per-tick clock handed to every update. `elapsed` is the time covered by
/// this tick, `total` the time since the session started.
#[derive(Clone, Debug)]
pub struct Time {
    pub elapsed: Duration,
    pub total: Duration,
}

impl Time {
    pub fn zero() -> Time {
        Time {
            elapsed: Duration::ZERO,
            total: Duration::ZERO,
        }
    }

    /// Produce the next tick's clock for a fixed-step loop.
    pub fn advanced(&self, elapsed: Duration) -> Time {
        Time {
            elapsed,
            total: self.total + elapsed,
        }
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::zero()
    }
}
