//! Round Tick
//!
//! One growth step of the live round: advance time, sample the curve,
//! append the trajectory point and report whether the target was reached.

use crate::game::events::EngineEvent;
use crate::game::growth::normalize;
use crate::game::round::{Round, Sample};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<EngineEvent>,
    /// Whether the round crashed this tick
    pub crashed: bool,
}

/// What a single step did to the round.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    /// Point appended to the trajectory.
    pub sample: Sample,
    /// Normalised `(x, y)` for the trajectory display.
    pub position: (f64, f64),
    /// Target reached; the round must crash.
    pub reached_target: bool,
}

/// Advance `round` by one tick.
///
/// The multiplier is clamped to the target before the sample is stored, so
/// no trajectory point ever exceeds the crash point.
pub fn step_round(round: &mut Round) -> StepOutcome {
    round.ticks += 1;
    round.elapsed_ms = round.curve.elapsed_at_tick(round.ticks);

    let next = round.curve.multiplier_at_tick(round.ticks);
    let target = round.target_multiplier();
    let reached_target = round.curve.is_terminal(round.ticks) || next >= target;
    let multiplier = if reached_target { target } else { next };

    debug_assert!(multiplier > round.current_multiplier);
    debug_assert!(round.elapsed_ms <= round.total_duration_ms());

    round.current_multiplier = multiplier;
    let sample = Sample {
        elapsed_ms: round.elapsed_ms,
        multiplier,
    };
    round.samples.push(sample);

    let position = normalize(
        round.elapsed_ms,
        round.total_duration_ms(),
        multiplier,
        round.display_ceiling(),
    );

    StepOutcome {
        sample,
        position,
        reached_target,
    }
}
