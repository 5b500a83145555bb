use std::time::{Duration, Instant};

const REPORT_PERIOD: Duration = Duration::from_secs(1);

/// Counts presented frames and reports the count once per second.
/// Lives on the render thread; reporting never feeds back into control flow.
#[derive(Debug, Clone)]
pub struct RateMonitor {
    count: u32,
    last_report: Instant,
}

impl RateMonitor {
    /// Start the first window at `now`.
    pub fn new(now: Instant) -> Self {
        Self { count: 0, last_report: now }
    }

    pub fn tick(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Frames counted in the current window so far.
    pub fn pending(&self) -> u32 {
        self.count
    }

    /// Once at least a second has passed since the last report, return the
    /// count and open a new window at `now`.
    pub fn maybe_report(&mut self, now: Instant) -> Option<u32> {
        if now.saturating_duration_since(self.last_report) < REPORT_PERIOD {
            return None;
        }
        let count = std::mem::take(&mut self.count);
        self.last_report = now;
        Some(count)
    }

    /// Forget the current window (new session).
    pub fn reset(&mut self, now: Instant) {
        self.count = 0;
        self.last_report = now;
    }
}

impl Default for RateMonitor {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}
