//! Growth Curve
//!
//! Maps tick count to multiplier. The curve is a lattice: step `k` sits at
//! `k * target / step_count`, so every tick adds the same increment and step
//! `step_count` lands on the target. A round opens at 1.0x and its first tick
//! lands on the first lattice step above 1.0x.
//!
//! Logical time and the scheduler period share one time base: each tick
//! advances `elapsed_ms` by `tick_interval_ms`.

use serde::{Serialize, Deserialize};

/// Default number of lattice steps from 0 to the target.
pub const DEFAULT_STEP_COUNT: u32 = 50;

/// Default tick period in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Multiplier every round starts at.
pub const START_MULTIPLIER: f64 = 1.0;

/// Growth curve for one round.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrowthCurve {
    target: f64,
    increment: f64,
    step_count: u32,
    first_step: u32,
    tick_interval_ms: u64,
}

impl GrowthCurve {
    /// Build the curve for `target`.
    ///
    /// `target` must be above 1.0 and `step_count` non-zero; the engine
    /// validates both before a round exists.
    pub fn new(target: f64, step_count: u32, tick_interval_ms: u64) -> Self {
        debug_assert!(target > START_MULTIPLIER);
        debug_assert!(step_count > 0);

        let increment = target / step_count as f64;

        let mut first_step = ((START_MULTIPLIER / increment).floor() as u32)
            .saturating_add(1)
            .min(step_count);
        while first_step < step_count && first_step as f64 * increment <= START_MULTIPLIER {
            first_step += 1;
        }

        Self {
            target,
            increment,
            step_count,
            first_step,
            tick_interval_ms,
        }
    }

    /// Crash point.
    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Multiplier added per tick.
    #[inline]
    pub fn increment(&self) -> f64 {
        self.increment
    }

    /// Logical milliseconds per tick.
    #[inline]
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    /// Time budget of a full curve, used to normalise the X axis.
    #[inline]
    pub fn total_duration_ms(&self) -> u64 {
        self.step_count as u64 * self.tick_interval_ms
    }

    /// Ticks from 1.0x until the crash tick, inclusive.
    #[inline]
    pub fn ticks_to_crash(&self) -> u32 {
        self.step_count - self.first_step + 1
    }

    /// Lattice step reached after `tick` ticks (`tick >= 1`).
    #[inline]
    pub fn step_for_tick(&self, tick: u32) -> u32 {
        self.first_step + tick.saturating_sub(1)
    }

    /// Multiplier at `step`, clamped to the target.
    #[inline]
    pub fn multiplier_at_step(&self, step: u32) -> f64 {
        if step >= self.step_count {
            self.target
        } else {
            (step as f64 * self.increment).min(self.target)
        }
    }

    /// Multiplier after `tick` ticks. Tick 0 is the opening 1.0x.
    pub fn multiplier_at_tick(&self, tick: u32) -> f64 {
        if tick == 0 {
            START_MULTIPLIER
        } else {
            self.multiplier_at_step(self.step_for_tick(tick))
        }
    }

    /// Logical elapsed time after `tick` ticks.
    #[inline]
    pub fn elapsed_at_tick(&self, tick: u32) -> u64 {
        tick as u64 * self.tick_interval_ms
    }

    /// Whether `tick` is the crash tick.
    #[inline]
    pub fn is_terminal(&self, tick: u32) -> bool {
        tick > 0 && self.step_for_tick(tick) >= self.step_count
    }
}

/// Position of a sample on a unit square: `(elapsed / total, multiplier / ceiling)`.
pub fn normalize(elapsed_ms: u64, total_duration_ms: u64, multiplier: f64, ceiling: f64) -> (f64, f64) {
    let x = if total_duration_ms == 0 {
        0.0
    } else {
        elapsed_ms as f64 / total_duration_ms as f64
    };
    let y = if ceiling > 0.0 { multiplier / ceiling } else { 0.0 };
    (x, y)
}
