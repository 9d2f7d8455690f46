/// Progress indicator between two code refetches.
///
/// Counts down one unit per tick and stops at zero; only a refetch resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    period: u32,
    remaining: u32,
}

impl Countdown {
    pub fn new(period: u32) -> Self {
        Self {
            period,
            remaining: period,
        }
    }

    pub fn tick(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    pub fn reset(&mut self) {
        self.remaining = self.period;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    /// Elapsed share of the period, 0.0 right after a refetch.
    pub fn progress(&self) -> f32 {
        if self.period == 0 {
            return 1.0;
        }
        (self.period - self.remaining) as f32 / self.period as f32
    }
}
