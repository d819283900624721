//! Protocol Messages
//!
//! Wire format between a presentation client and its engine session.
//! JSON text frames carry the tagged message enums; binary frames carry a
//! fixed-layout `BinaryAction` encoded with bincode.

use serde::{Serialize, Deserialize};

use crate::game::engine::{EngineError, EngineSnapshot};
use crate::game::events::EngineEvent;
use crate::game::round::RoundId;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Stake an amount and start a round.
    PlaceBet { amount: f64 },

    /// Lock in the current multiplier.
    CashOut,

    /// Request a full state snapshot.
    Sync,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },

    /// Close the session.
    Leave,
}

/// Compact binary action.
///
/// Tagged enums (#[serde(tag = "type")]) are not supported by bincode, so
/// binary frames use this flat struct instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryAction {
    /// Action kind, see the `ACTION_*` constants.
    pub action: u8,
    /// Stake for `ACTION_PLACE_BET`, ignored otherwise.
    pub amount: f64,
}

impl BinaryAction {
    /// Place a bet.
    pub const ACTION_PLACE_BET: u8 = 1;
    /// Cash out.
    pub const ACTION_CASH_OUT: u8 = 2;
    /// Request a snapshot.
    pub const ACTION_SYNC: u8 = 3;

    /// Convert to a client message, `None` for an unknown action.
    pub fn to_client_message(&self) -> Option<ClientMessage> {
        match self.action {
            Self::ACTION_PLACE_BET => Some(ClientMessage::PlaceBet { amount: self.amount }),
            Self::ACTION_CASH_OUT => Some(ClientMessage::CashOut),
            Self::ACTION_SYNC => Some(ClientMessage::Sync),
            _ => None,
        }
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after the connection opens.
    Welcome(WelcomeInfo),

    /// Engine event.
    Event(EngineEvent),

    /// Bet accepted, round started.
    BetAccepted { round_id: RoundId, balance: f64 },

    /// Cash-out settled.
    CashOutAccepted(CashOutReceipt),

    /// Full state snapshot.
    State(EngineSnapshot),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Greeting for a new connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeInfo {
    /// Session identifier (hex).
    pub session_id: String,
    /// Starting balance.
    pub balance: f64,
    /// Server version.
    pub server_version: String,
    /// Tick period in milliseconds.
    pub tick_interval_ms: u64,
}

/// Result of a successful cash-out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashOutReceipt {
    /// Round cashed out of.
    pub round_id: RoundId,
    /// Locked-in multiplier.
    pub multiplier: f64,
    /// Amount credited.
    pub payout: f64,
    /// Balance after the credit.
    pub balance: f64,
}

/// Server error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message.
    InvalidInput,
    /// Bad stake or stake above balance.
    InvalidWager,
    /// Bet outside Idle.
    EngineBusy,
    /// Cash-out outside Flying or repeated.
    IllegalAction,
    /// Double settlement.
    AlreadySettled,
    /// Server-side failure.
    InternalError,
}

impl From<&EngineError> for ErrorCode {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::InvalidWager { .. } => ErrorCode::InvalidWager,
            EngineError::EngineBusy(_) => ErrorCode::EngineBusy,
            EngineError::IllegalAction(_) => ErrorCode::IllegalAction,
            EngineError::AlreadySettled => ErrorCode::AlreadySettled,
        }
    }
}

impl From<EngineError> for ServerError {
    fn from(err: EngineError) -> Self {
        Self {
            code: ErrorCode::from(&err),
            message: err.to_string(),
        }
    }
}

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
