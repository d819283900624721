//! Game Logic Module
//!
//! Round lifecycle engine. Nothing here touches the clock or the network;
//! time only advances when the scheduler calls `CrashEngine::tick`.
//!
//! ## Module Structure
//!
//! - `target`: Crash point and display ceiling generation
//! - `growth`: Tick-indexed multiplier curve
//! - `round`: Round, wager and phase types
//! - `ledger`: Balance, settlement and bet history
//! - `tick`: One growth step of the live round
//! - `engine`: Round state machine
//! - `events`: Outbound events for presentation

pub mod target;
pub mod growth;
pub mod round;
pub mod ledger;
pub mod tick;
pub mod engine;
pub mod events;

// Re-export key types
pub use engine::{CrashEngine, EngineConfig, EngineError, EngineSnapshot, RoundSnapshot};
pub use events::EngineEvent;
pub use ledger::{HistoryEntry, Ledger, LedgerError, Outcome};
pub use round::{Phase, Round, RoundId, Wager};
pub use target::{RoundTarget, TargetSource};
pub use tick::TickResult;
