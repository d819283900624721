//! Round State Machine
//!
//! `CrashEngine` owns the ledger and the live round and enforces which
//! actions are legal in each phase:
//!
//! ```text
//! Idle --place_bet--> Flying --target reached--> Crashed
//!   ^                  |  ^                         |
//!   |                  cash_out (once)          crash display
//!   |                                               v
//! Cooldown <--------------------------------- Resetting
//! ```
//!
//! Timer-driven transitions take the round id they were scheduled for and
//! do nothing when it no longer matches the live round.

use std::time::Duration;

use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::game::events::EngineEvent;
use crate::game::growth::{GrowthCurve, DEFAULT_STEP_COUNT, DEFAULT_TICK_INTERVAL_MS};
use crate::game::ledger::{HistoryEntry, Ledger, LedgerError};
use crate::game::round::{Phase, Round, RoundId, Sample, Wager};
use crate::game::target::{
    RoundTarget, TargetGenerator, TargetSource, DEFAULT_MIN_MULTIPLIER, MAX_MULTIPLIER,
};
use crate::game::tick::{step_round, TickResult};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Starting balance.
    pub initial_balance: f64,
    /// Lowest crash point.
    pub min_multiplier: f64,
    /// Highest display ceiling.
    pub max_multiplier: f64,
    /// Lattice steps from 0 to the target.
    pub step_count: u32,
    /// Tick period, both real and logical.
    pub tick_interval: Duration,
    /// How long the crash stays on screen.
    pub crash_display: Duration,
    /// Pause between reset and cooldown.
    pub reset_delay: Duration,
    /// Blocking cooldown before the next bet.
    pub cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1000.0,
            min_multiplier: DEFAULT_MIN_MULTIPLIER,
            max_multiplier: MAX_MULTIPLIER,
            step_count: DEFAULT_STEP_COUNT,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            crash_display: Duration::from_millis(2000),
            reset_delay: Duration::ZERO,
            cooldown: Duration::from_millis(1000),
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_balance.is_finite() || self.initial_balance < 0.0 {
            return Err(ConfigError::InitialBalance(self.initial_balance));
        }
        if !self.min_multiplier.is_finite() || self.min_multiplier <= 1.0 {
            return Err(ConfigError::MinMultiplier(self.min_multiplier));
        }
        if !self.max_multiplier.is_finite() || self.max_multiplier < self.min_multiplier {
            return Err(ConfigError::MaxMultiplier {
                min: self.min_multiplier,
                max: self.max_multiplier,
            });
        }
        if self.step_count == 0 {
            return Err(ConfigError::StepCount);
        }
        if self.tick_interval < Duration::from_millis(1) {
            return Err(ConfigError::TickInterval);
        }
        Ok(())
    }

    /// Tick period in whole milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval.as_millis() as u64
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Negative or non-finite starting balance.
    #[error("Initial balance must be a non-negative number, got {0}")]
    InitialBalance(f64),

    /// Crash floor at or below 1.0x.
    #[error("Minimum multiplier must be above 1.0, got {0}")]
    MinMultiplier(f64),

    /// Ceiling below floor.
    #[error("Maximum multiplier {max} is below minimum {min}")]
    MaxMultiplier {
        /// Configured floor.
        min: f64,
        /// Configured ceiling.
        max: f64,
    },

    /// Zero growth steps.
    #[error("Step count must be non-zero")]
    StepCount,

    /// Tick period under a millisecond.
    #[error("Tick interval must be at least 1ms")]
    TickInterval,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Rejected player actions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Bad amount, or amount above balance.
    #[error("Invalid wager of {amount} (balance {balance:.2})")]
    InvalidWager {
        /// Requested stake.
        amount: f64,
        /// Balance at the time.
        balance: f64,
    },

    /// Bet attempted outside Idle.
    #[error("Engine busy ({0})")]
    EngineBusy(Phase),

    /// Cash-out outside Flying, or repeated.
    #[error("Illegal action: {0}")]
    IllegalAction(&'static str),

    /// Wager settled twice.
    #[error("Wager already settled")]
    AlreadySettled,
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Read-only view of the live round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    /// Round id.
    pub round_id: RoundId,
    /// Display ceiling.
    pub ceiling: f64,
    /// Curve time budget.
    pub total_duration_ms: u64,
    /// Logical elapsed time.
    pub elapsed_ms: u64,
    /// Current multiplier.
    pub multiplier: f64,
    /// Crash point; hidden until the round has crashed.
    pub crash_point: Option<f64>,
    /// Stake.
    pub wager: f64,
    /// Locked-in multiplier, if cashed out.
    pub cash_out_multiplier: Option<f64>,
    /// Trajectory so far.
    pub samples: Vec<Sample>,
}

/// Read-only view of the whole engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Current phase.
    pub phase: Phase,
    /// Current balance.
    pub balance: f64,
    /// Bet history.
    pub history: Vec<HistoryEntry>,
    /// Payouts minus stakes over the history.
    pub net_profit: f64,
    /// Live or most recent round.
    pub round: Option<RoundSnapshot>,
}

// =============================================================================
// ENGINE
// =============================================================================

/// The round lifecycle engine.
pub struct CrashEngine {
    config: EngineConfig,
    phase: Phase,
    ledger: Ledger,
    round: Option<Round>,
    last_round_id: RoundId,
    targets: Box<dyn TargetSource>,
    events: Vec<EngineEvent>,
}

impl CrashEngine {
    /// Create an engine seeded from OS entropy.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let targets = TargetGenerator::from_entropy(config.min_multiplier, config.max_multiplier);
        info!("Engine seed {}", hex::encode(targets.engine_seed().to_le_bytes()));
        Ok(Self::build(config, Box::new(targets)))
    }

    /// Create an engine with a fixed seed.
    pub fn with_seed(config: EngineConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let targets = TargetGenerator::new(seed, config.min_multiplier, config.max_multiplier);
        Ok(Self::build(config, Box::new(targets)))
    }

    /// Create an engine drawing targets from `targets`.
    pub fn with_target_source(
        config: EngineConfig,
        targets: Box<dyn TargetSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, targets))
    }

    fn build(config: EngineConfig, targets: Box<dyn TargetSource>) -> Self {
        Self {
            ledger: Ledger::new(config.initial_balance),
            config,
            phase: Phase::Idle,
            round: None,
            last_round_id: RoundId::default(),
            targets,
            events: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Player actions
    // -------------------------------------------------------------------------

    /// Stake `amount` and start a round.
    pub fn place_bet(&mut self, amount: f64) -> Result<RoundId, EngineError> {
        if !self.phase.accepts_bets() {
            return Err(EngineError::EngineBusy(self.phase));
        }

        let balance = self.ledger.balance();
        self.ledger.debit(amount).map_err(|e| match e {
            LedgerError::AlreadySettled => EngineError::AlreadySettled,
            LedgerError::InvalidAmount(_) | LedgerError::InsufficientBalance { .. } => {
                EngineError::InvalidWager { amount, balance }
            }
        })?;

        let round_id = self.last_round_id.next();
        self.last_round_id = round_id;

        let target = self.checked_target(round_id);
        let curve = GrowthCurve::new(target.target, self.config.step_count, self.config.tick_interval_ms());
        let round = Round::new(round_id, target, curve, Wager::new(round_id, amount));

        debug!(
            "Round {} bet {:.2}, ceiling {:.2}, {} ticks",
            round_id,
            amount,
            target.ceiling,
            curve.ticks_to_crash()
        );

        self.events.push(EngineEvent::BetPlaced {
            round_id,
            amount,
            balance: self.ledger.balance(),
        });
        self.events.push(EngineEvent::RoundStarted {
            round_id,
            ceiling: target.ceiling,
            total_duration_ms: curve.total_duration_ms(),
        });

        self.round = Some(round);
        self.phase = Phase::Flying;

        Ok(round_id)
    }

    /// Lock in the current multiplier. The round keeps climbing.
    ///
    /// Returns the payout.
    pub fn cash_out(&mut self) -> Result<f64, EngineError> {
        if self.phase != Phase::Flying {
            return Err(EngineError::IllegalAction("cash-out is only allowed while flying"));
        }

        let round = self
            .round
            .as_mut()
            .ok_or(EngineError::IllegalAction("no live round"))?;

        if round.wager.cashed_out() {
            return Err(EngineError::IllegalAction("already cashed out this round"));
        }
        if round.ticks == 0 {
            return Err(EngineError::IllegalAction("round has not started climbing"));
        }

        let multiplier = round.current_multiplier;
        let payout = self
            .ledger
            .settle(&mut round.wager, multiplier)
            .map_err(|_| EngineError::AlreadySettled)?;

        debug!("Round {} cashed out at {} for {:.2}", round.id, format_multiplier(multiplier), payout);

        self.events.push(EngineEvent::CashedOut {
            round_id: round.id,
            multiplier,
            payout,
            balance: self.ledger.balance(),
        });

        Ok(payout)
    }

    // -------------------------------------------------------------------------
    // Scheduler-driven transitions
    // -------------------------------------------------------------------------

    /// Apply one growth tick to round `round_id`.
    ///
    /// `None` when the round is stale or not Flying.
    pub fn tick(&mut self, round_id: RoundId) -> Option<TickResult> {
        if self.phase != Phase::Flying {
            return None;
        }
        let round = self.round.as_mut().filter(|r| r.id == round_id)?;

        let outcome = step_round(round);

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(
            "Round {} tick {} at {}ms: {:.4}",
            round.id,
            round.ticks,
            outcome.sample.elapsed_ms,
            outcome.sample.multiplier
        );

        self.events.push(EngineEvent::Tick {
            round_id,
            elapsed_ms: outcome.sample.elapsed_ms,
            multiplier: outcome.sample.multiplier,
            normalized_x: outcome.position.0,
            normalized_y: outcome.position.1,
        });

        if outcome.reached_target {
            self.crash();
        }

        Some(TickResult {
            events: self.take_events(),
            crashed: outcome.reached_target,
        })
    }

    /// Crashed → Resetting. Clears the trajectory.
    pub fn begin_reset(&mut self, round_id: RoundId) -> Option<Vec<EngineEvent>> {
        let round = self.live_round_in(round_id, Phase::Crashed)?;
        round.samples.clear();

        self.phase = Phase::Resetting;
        self.events.push(EngineEvent::RoundReset { round_id });
        Some(self.take_events())
    }

    /// Resetting → Cooldown.
    pub fn begin_cooldown(&mut self, round_id: RoundId) -> Option<Vec<EngineEvent>> {
        self.live_round_in(round_id, Phase::Resetting)?;

        self.phase = Phase::Cooldown;
        self.events.push(EngineEvent::CooldownStarted { round_id });
        Some(self.take_events())
    }

    /// Cooldown → Idle.
    pub fn end_cooldown(&mut self, round_id: RoundId) -> Option<Vec<EngineEvent>> {
        self.live_round_in(round_id, Phase::Cooldown)?;

        self.phase = Phase::Idle;
        self.events.push(EngineEvent::CooldownEnded { round_id });
        Some(self.take_events())
    }

    fn live_round_in(&mut self, round_id: RoundId, phase: Phase) -> Option<&mut Round> {
        if self.phase != phase {
            return None;
        }
        self.round.as_mut().filter(|r| r.id == round_id)
    }

    fn crash(&mut self) {
        let Some(round) = self.round.as_mut() else {
            return;
        };

        let final_multiplier = round.target_multiplier();
        let cashed_out = round.wager.cashed_out();

        if round.wager.is_open() {
            // Stake was debited at placement; nothing to credit
            if let Err(e) = self.ledger.record_loss(&mut round.wager, final_multiplier) {
                warn!("Round {} loss not recorded: {}", round.id, e);
            }
        }

        info!(
            "Round {} crashed at {} ({})",
            round.id,
            format_multiplier(final_multiplier),
            if cashed_out { "cashed out" } else { "lost" }
        );

        self.phase = Phase::Crashed;
        self.events.push(EngineEvent::RoundCrashed {
            round_id: round.id,
            final_multiplier,
            cashed_out,
        });
    }

    fn checked_target(&mut self, round_id: RoundId) -> RoundTarget {
        let drawn = self.targets.next_target(round_id);
        debug_assert!(drawn.target > 1.0 && drawn.target <= drawn.ceiling);
        drawn
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Drain queued events.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current balance.
    pub fn balance(&self) -> f64 {
        self.ledger.balance()
    }

    /// Bet history.
    pub fn history(&self) -> &[HistoryEntry] {
        self.ledger.history()
    }

    /// Live or most recent round.
    pub fn round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Id of the live or most recent round.
    pub fn current_round_id(&self) -> Option<RoundId> {
        self.round.as_ref().map(|r| r.id)
    }

    /// Configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Serializable view for presentation.
    pub fn snapshot(&self) -> EngineSnapshot {
        let round = self.round.as_ref().map(|r| RoundSnapshot {
            round_id: r.id,
            ceiling: r.display_ceiling(),
            total_duration_ms: r.total_duration_ms(),
            elapsed_ms: r.elapsed_ms,
            multiplier: r.current_multiplier,
            crash_point: (self.phase != Phase::Flying).then(|| r.target_multiplier()),
            wager: r.wager.amount(),
            cash_out_multiplier: r.wager.cash_out_multiplier(),
            samples: r.samples.clone(),
        });

        EngineSnapshot {
            phase: self.phase,
            balance: self.ledger.balance(),
            history: self.ledger.history().to_vec(),
            net_profit: self.ledger.net_profit(),
            round,
        }
    }
}

/// Format a multiplier for display, e.g. `2.10x`.
pub fn format_multiplier(multiplier: f64) -> String {
    format!("{:.2}x", multiplier)
}

/// Format an amount for display with two decimals.
pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}
