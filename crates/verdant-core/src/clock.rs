//! World clock for the Verdant simulation.
//!
//! The clock is the single source of truth for simulated time. It holds the
//! tick counter; the day number and the position within the day are derived
//! from it, never stored.
//!
//! The counter starts at 0 and is incremented at the *start* of each tick,
//! so the first tick that runs is tick 1.

use verdant_world::environment::{DAY_LENGTH_TICKS, is_daytime, time_of_day};

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,
}

/// World clock tracking the simulation's tick counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldClock {
    /// Current tick number. 0 until the first tick starts.
    tick: u64,
}

impl WorldClock {
    /// Create a clock at tick 0.
    pub const fn new() -> Self {
        Self { tick: 0 }
    }

    /// Create a clock at an explicit tick (state restoration, tests).
    pub const fn from_tick(tick: u64) -> Self {
        Self { tick }
    }

    /// Advance the clock by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the tick counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// Return the current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Position of the current tick within its day, `0..DAY_LENGTH_TICKS`.
    pub const fn time_of_day(&self) -> u64 {
        time_of_day(self.tick)
    }

    /// Whether the sun is up at the current tick.
    pub const fn is_daytime(&self) -> bool {
        is_daytime(self.tick)
    }

    /// Zero-based day number of the current tick.
    pub const fn day(&self) -> u64 {
        self.tick / DAY_LENGTH_TICKS
    }

    /// Ticks remaining until the next day starts.
    pub const fn ticks_until_next_day(&self) -> u64 {
        DAY_LENGTH_TICKS.saturating_sub(self.time_of_day())
    }
}
