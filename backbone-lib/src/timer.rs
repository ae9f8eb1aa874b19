//! This module contains the tick based countdown, that drives the automatic status requests of a client.

/// Counts engine ticks down and fires once it runs out, then starts over.
///
/// A fresh countdown is already expired, so the first tick fires right away.
#[derive(Debug, Clone)]
pub struct TickCountdown {
    period: u32,
    remaining: u32,
}

impl TickCountdown {
    /// Creates a countdown with the indicated period in ticks. A period of 0 is treated as 1.
    pub fn new(period: u32) -> TickCountdown {
        TickCountdown {
            period: period.max(1),
            remaining: 0,
        }
    }

    /// Derives the period from the tick length and the interval, both in milliseconds.
    pub fn from_millis(interval_ms: u64, tick_ms: u64) -> TickCountdown {
        let ticks = interval_ms / tick_ms.max(1);
        TickCountdown::new(u32::try_from(ticks).unwrap_or(u32::MAX))
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    /// Something happened on the connection, we start counting from the top again.
    pub fn restart(&mut self) {
        self.remaining = self.period;
    }

    /// Makes the next tick fire.
    pub fn expire(&mut self) {
        self.remaining = 0;
    }

    /// Advances by one tick, returns true if the countdown ran out. In that case it restarts on its own.
    pub fn tick(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.remaining = self.period;
            return true;
        }
        false
    }
}
