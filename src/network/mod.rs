//! Network Layer
//!
//! WebSocket server and round scheduler. Everything with a clock lives
//! here; round rules live in `game/`.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{
    BinaryAction, CashOutReceipt, ClientMessage, ErrorCode, ServerError, ServerMessage,
    WelcomeInfo,
};
pub use session::{run_round_loop, GameSession, RoundTiming, SessionId, SessionManager};
pub use server::{GameServer, GameServerError, ServerConfig};
