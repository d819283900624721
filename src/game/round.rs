//! Round State Definitions
//!
//! The live round, its wager and the phase enum the engine moves through.

use std::fmt;

use serde::{Serialize, Deserialize};

use crate::game::growth::{GrowthCurve, START_MULTIPLIER};
use crate::game::target::RoundTarget;

// =============================================================================
// ROUND ID
// =============================================================================

/// Sequential round identifier, unique per engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct RoundId(pub u64);

impl RoundId {
    /// Wrap a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id after this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// PHASE
// =============================================================================

/// Engine phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Phase {
    /// Waiting for a bet.
    #[default]
    Idle,
    /// Multiplier climbing; cash-out allowed once.
    Flying,
    /// Target reached; final multiplier on display.
    Crashed,
    /// Trajectory being cleared.
    Resetting,
    /// Blocking pause before the next bet.
    Cooldown,
}

impl Phase {
    /// Whether a new bet may be placed.
    #[inline]
    pub fn accepts_bets(self) -> bool {
        self == Phase::Idle
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Flying => "flying",
            Phase::Crashed => "crashed",
            Phase::Resetting => "resetting",
            Phase::Cooldown => "cooldown",
        };
        f.write_str(name)
    }
}

// =============================================================================
// WAGER
// =============================================================================

/// Settlement state of a wager.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WagerState {
    /// Debited, not yet settled.
    Open,
    /// Cashed out at `multiplier`.
    CashedOut {
        /// Locked-in multiplier.
        multiplier: f64,
        /// Amount credited.
        payout: f64,
    },
    /// Round crashed before a cash-out.
    Lost,
}

/// The single bet riding on a round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    round_id: RoundId,
    amount: f64,
    state: WagerState,
}

impl Wager {
    /// Open a wager for `round_id`.
    pub fn new(round_id: RoundId, amount: f64) -> Self {
        Self {
            round_id,
            amount,
            state: WagerState::Open,
        }
    }

    /// Round this wager rides on.
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    /// Stake.
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Settlement state.
    pub fn state(&self) -> WagerState {
        self.state
    }

    /// True once cashed out.
    pub fn cashed_out(&self) -> bool {
        matches!(self.state, WagerState::CashedOut { .. })
    }

    /// Locked-in multiplier, if cashed out.
    pub fn cash_out_multiplier(&self) -> Option<f64> {
        match self.state {
            WagerState::CashedOut { multiplier, .. } => Some(multiplier),
            _ => None,
        }
    }

    /// Still open for settlement.
    pub fn is_open(&self) -> bool {
        self.state == WagerState::Open
    }

    pub(crate) fn set_state(&mut self, state: WagerState) {
        self.state = state;
    }
}

// =============================================================================
// ROUND
// =============================================================================

/// One trajectory point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Logical time since round start.
    pub elapsed_ms: u64,
    /// Multiplier at that time.
    pub multiplier: f64,
}

/// The live round.
#[derive(Clone, Debug)]
pub struct Round {
    /// Identifier.
    pub id: RoundId,
    /// Crash point and ceiling.
    pub target: RoundTarget,
    /// Growth curve derived from the target.
    pub curve: GrowthCurve,
    /// Ticks applied so far.
    pub ticks: u32,
    /// Logical elapsed time.
    pub elapsed_ms: u64,
    /// Current multiplier.
    pub current_multiplier: f64,
    /// Trajectory, append-only until reset.
    pub samples: Vec<Sample>,
    /// The bet.
    pub wager: Wager,
}

impl Round {
    /// Create a round at 1.0x.
    pub fn new(id: RoundId, target: RoundTarget, curve: GrowthCurve, wager: Wager) -> Self {
        Self {
            id,
            target,
            curve,
            ticks: 0,
            elapsed_ms: 0,
            current_multiplier: START_MULTIPLIER,
            samples: Vec::with_capacity(curve.ticks_to_crash() as usize),
            wager,
        }
    }

    /// Crash point.
    #[inline]
    pub fn target_multiplier(&self) -> f64 {
        self.target.target
    }

    /// Display ceiling.
    #[inline]
    pub fn display_ceiling(&self) -> f64 {
        self.target.ceiling
    }

    /// Time budget for the curve.
    #[inline]
    pub fn total_duration_ms(&self) -> u64 {
        self.curve.total_duration_ms()
    }
}
