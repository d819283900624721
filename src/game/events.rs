//! Engine Events
//!
//! Outbound notifications for presentation subscribers (chart, sprite,
//! audio). The engine queues them during a transition; the session drains
//! and broadcasts them.

use serde::{Serialize, Deserialize};

use crate::game::round::{Phase, RoundId};

/// Event emitted by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Wager accepted and debited.
    BetPlaced {
        round_id: RoundId,
        amount: f64,
        balance: f64,
    },

    /// Round began climbing.
    RoundStarted {
        round_id: RoundId,
        ceiling: f64,
        total_duration_ms: u64,
    },

    /// One growth step.
    Tick {
        round_id: RoundId,
        elapsed_ms: u64,
        multiplier: f64,
        /// `elapsed / total_duration`
        normalized_x: f64,
        /// `multiplier / ceiling`
        normalized_y: f64,
    },

    /// Wager settled mid-flight.
    CashedOut {
        round_id: RoundId,
        multiplier: f64,
        payout: f64,
        balance: f64,
    },

    /// Target reached.
    RoundCrashed {
        round_id: RoundId,
        final_multiplier: f64,
        /// Whether the wager was cashed out before the crash.
        cashed_out: bool,
    },

    /// Trajectory cleared.
    RoundReset { round_id: RoundId },

    /// Blocking cooldown began.
    CooldownStarted { round_id: RoundId },

    /// Engine is Idle again.
    CooldownEnded { round_id: RoundId },
}

impl EngineEvent {
    /// Round the event belongs to.
    pub fn round_id(&self) -> RoundId {
        match self {
            EngineEvent::BetPlaced { round_id, .. }
            | EngineEvent::RoundStarted { round_id, .. }
            | EngineEvent::Tick { round_id, .. }
            | EngineEvent::CashedOut { round_id, .. }
            | EngineEvent::RoundCrashed { round_id, .. }
            | EngineEvent::RoundReset { round_id }
            | EngineEvent::CooldownStarted { round_id }
            | EngineEvent::CooldownEnded { round_id } => *round_id,
        }
    }

    /// Phase the engine is in right after this event.
    pub fn phase_after(&self) -> Phase {
        match self {
            EngineEvent::BetPlaced { .. }
            | EngineEvent::RoundStarted { .. }
            | EngineEvent::Tick { .. }
            | EngineEvent::CashedOut { .. } => Phase::Flying,
            EngineEvent::RoundCrashed { .. } => Phase::Crashed,
            EngineEvent::RoundReset { .. } => Phase::Resetting,
            EngineEvent::CooldownStarted { .. } => Phase::Cooldown,
            EngineEvent::CooldownEnded { .. } => Phase::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_tag() {
        let event = EngineEvent::RoundCrashed {
            round_id: RoundId::new(3),
            final_multiplier: 3.5,
            cashed_out: false,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"round_crashed\""));
        assert!(json.contains("\"final_multiplier\":3.5"));

        let parsed: EngineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_phase_after() {
        let id = RoundId::new(1);
        assert_eq!(EngineEvent::RoundReset { round_id: id }.phase_after(), Phase::Resetting);
        assert_eq!(EngineEvent::CooldownEnded { round_id: id }.phase_after(), Phase::Idle);
        assert_eq!(EngineEvent::CooldownEnded { round_id: id }.round_id(), id);
    }
}
