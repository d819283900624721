//! Crash Point Generation
//!
//! Draws the hidden target multiplier and the display ceiling used to scale
//! the growth curve. Not provably fair: the draw is a plain uniform pick.

use std::collections::VecDeque;

use serde::{Serialize, Deserialize};

use crate::core::rng::{derive_round_seed, RoundRng};
use crate::game::round::RoundId;

/// Default lower bound for a crash point.
pub const DEFAULT_MIN_MULTIPLIER: f64 = 1.01;

/// Upper bound for the display ceiling.
pub const MAX_MULTIPLIER: f64 = 100.0;

/// Crash point and display ceiling for one round.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundTarget {
    /// Multiplier at which the round crashes.
    pub target: f64,
    /// Upper bound of the presentation's Y axis.
    pub ceiling: f64,
}

impl RoundTarget {
    /// Build a target, rejecting pairs that break `1.0 < target <= ceiling`.
    pub fn new(target: f64, ceiling: f64) -> Option<Self> {
        let valid = target.is_finite()
            && ceiling.is_finite()
            && target > 1.0
            && target <= ceiling;
        valid.then_some(Self { target, ceiling })
    }
}

/// Round to two decimal places.
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Draw a target in `[min, ceiling]` with `ceiling` in `[min, max]`.
///
/// Both values are rounded to two decimals and clamped back into range, so
/// `min <= target <= ceiling <= max` holds even when `min` carries more
/// precision than the rounding keeps.
pub fn generate(rng: &mut RoundRng, min_multiplier: f64, max_multiplier: f64) -> RoundTarget {
    let ceiling = round2(rng.uniform(min_multiplier, max_multiplier))
        .clamp(min_multiplier, max_multiplier);
    let target = round2(rng.uniform(min_multiplier, ceiling))
        .clamp(min_multiplier, ceiling);

    RoundTarget { target, ceiling }
}

/// Supplies the crash point for each new round.
pub trait TargetSource: Send + Sync {
    /// Produce the target for `round_id`.
    fn next_target(&mut self, round_id: RoundId) -> RoundTarget;
}

/// Production source: a fresh generator per round, seeded from the engine
/// seed and the round id.
#[derive(Clone, Debug)]
pub struct TargetGenerator {
    engine_seed: u64,
    min_multiplier: f64,
    max_multiplier: f64,
}

impl TargetGenerator {
    /// Create a generator with explicit bounds.
    pub fn new(engine_seed: u64, min_multiplier: f64, max_multiplier: f64) -> Self {
        Self {
            engine_seed,
            min_multiplier,
            max_multiplier,
        }
    }

    /// Seed the engine from OS entropy.
    pub fn from_entropy(min_multiplier: f64, max_multiplier: f64) -> Self {
        Self::new(RoundRng::from_entropy().next_u64(), min_multiplier, max_multiplier)
    }

    /// Engine seed, for logging and replay.
    pub fn engine_seed(&self) -> u64 {
        self.engine_seed
    }
}

impl TargetSource for TargetGenerator {
    fn next_target(&mut self, round_id: RoundId) -> RoundTarget {
        let seed = derive_round_seed(self.engine_seed, round_id.get());
        let mut rng = RoundRng::new(seed);
        generate(&mut rng, self.min_multiplier, self.max_multiplier)
    }
}

/// Replays a fixed list of targets, then falls back to `fallback`.
pub struct ScriptedTargets {
    queue: VecDeque<RoundTarget>,
    fallback: TargetGenerator,
}

impl ScriptedTargets {
    /// Queue `targets` in order.
    pub fn new(targets: impl IntoIterator<Item = RoundTarget>, fallback: TargetGenerator) -> Self {
        Self {
            queue: targets.into_iter().collect(),
            fallback,
        }
    }
}

impl TargetSource for ScriptedTargets {
    fn next_target(&mut self, round_id: RoundId) -> RoundTarget {
        self.queue
            .pop_front()
            .unwrap_or_else(|| self.fallback.next_target(round_id))
    }
}
