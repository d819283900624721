//! # Crash Round Server
//!
//! Single-player crash-style wagering rounds: stake, watch the multiplier
//! climb, cash out before it crashes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CRASH ROUND SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Seedable primitives                       │
//! │  └── rng.rs      - Xorshift128+ PRNG and seed derivation     │
//! │                                                              │
//! │  game/           - Round rules (no clock, no I/O)            │
//! │  ├── target.rs   - Crash point and ceiling generation        │
//! │  ├── growth.rs   - Tick-indexed multiplier curve             │
//! │  ├── round.rs    - Round, wager and phase types              │
//! │  ├── ledger.rs   - Balance, settlement and history           │
//! │  ├── tick.rs     - One growth step                           │
//! │  ├── engine.rs   - Round state machine                       │
//! │  └── events.rs   - Outbound events                           │
//! │                                                              │
//! │  network/        - Scheduling and transport                  │
//! │  ├── session.rs  - Per-player engine and round timers        │
//! │  ├── protocol.rs - Message types                             │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Round Lifecycle
//!
//! `Idle → Flying → Crashed → Resetting → Cooldown → Idle`
//!
//! A bet is the only way out of `Idle`. Every later transition is driven by
//! the session scheduler and keyed by round id, so a timer left over from an
//! earlier round can never touch the current one.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use crate::core::rng::RoundRng;
pub use game::engine::{CrashEngine, EngineConfig, EngineError};
pub use game::events::EngineEvent;
pub use game::round::{Phase, RoundId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
