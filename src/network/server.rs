//! WebSocket Game Server
//!
//! Each connection gets its own single-player session. The server relays
//! engine events to the client and turns client messages into engine
//! actions.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::engine::{ConfigError, EngineConfig};
use crate::network::protocol::{
    BinaryAction, ClientMessage, ErrorCode, ServerError, ServerMessage, WelcomeInfo,
};
use crate::game::round::Phase;
use crate::network::session::{GameSession, SessionManager};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Close a connection after this long without a client message.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
    /// Engine settings for every session.
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `CRASH_BIND_ADDR`, `CRASH_MAX_CONNECTIONS`
    /// and `CRASH_INITIAL_BALANCE`.
    pub fn from_env() -> Result<Self, GameServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, GameServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("CRASH_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|_| GameServerError::Config(format!("invalid CRASH_BIND_ADDR: {}", addr)))?;
        }
        if let Some(max) = lookup("CRASH_MAX_CONNECTIONS") {
            config.max_connections = max.parse().map_err(|_| {
                GameServerError::Config(format!("invalid CRASH_MAX_CONNECTIONS: {}", max))
            })?;
        }
        if let Some(balance) = lookup("CRASH_INITIAL_BALANCE") {
            config.engine.initial_balance = balance.parse().map_err(|_| {
                GameServerError::Config(format!("invalid CRASH_INITIAL_BALANCE: {}", balance))
            })?;
        }

        config.engine.validate()?;
        Ok(config)
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Bad engine settings.
    #[error("Engine config: {0}")]
    Engine(#[from] ConfigError),

    /// Bad server settings.
    #[error("Config error: {0}")]
    Config(String),
}

/// Connected client state.
struct ConnectedClient {
    connected_at: Instant,
}

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    sessions: Arc<SessionManager>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            sessions: Arc::new(SessionManager::new(config.engine.clone())),
            config,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if !self.reserve_slot(addr).await {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.sessions.close_all().await;
        Ok(())
    }

    /// Count `addr` against the connection limit before its handshake starts.
    async fn reserve_slot(&self, addr: SocketAddr) -> bool {
        let mut clients = self.clients.write().await;
        if clients.len() >= self.config.max_connections {
            return false;
        }
        clients.insert(addr, ConnectedClient {
            connected_at: Instant::now(),
        });
        true
    }

    /// Serve a reserved connection and release its slot when it ends.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let sessions = self.sessions.clone();
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            Self::serve_connection(stream, addr, &sessions, &config, shutdown_rx).await;

            if let Some(client) = clients.write().await.remove(&addr) {
                info!("Client {} cleaned up after {:?}", addr, client.connected_at.elapsed());
            }
        });
    }

    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        sessions: &SessionManager,
        config: &ServerConfig,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {}", addr, e);
                return;
            }
        };

        let session = match sessions.create_session().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to create session for {}: {}", addr, e);
                return;
            }
        };

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

        // Outbound: serialize and write
        let sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        // Engine events → client
        let mut events = session.subscribe();
        let event_tx = msg_tx.clone();
        let relay_task = tokio::spawn(async move {
            let mut phase = Phase::Idle;
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let next = event.phase_after();
                        if next != phase {
                            debug!("Client {} round {} now {}", addr, event.round_id(), next);
                            phase = next;
                        }
                        if event_tx.send(ServerMessage::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, {} events dropped", addr, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let _ = msg_tx.send(ServerMessage::Welcome(WelcomeInfo {
            session_id: hex::encode(session.id),
            balance: session.balance().await,
            server_version: config.version.clone(),
            tick_interval_ms: session.tick_interval().await.as_millis() as u64,
        })).await;

        // Inbound
        loop {
            tokio::select! {
                msg = tokio::time::timeout(config.idle_timeout, ws_receiver.next()) => {
                    let msg = match msg {
                        Ok(msg) => msg,
                        Err(_) => {
                            info!("Client {} idle, closing", addr);
                            break;
                        }
                    };

                    let client_msg = match msg {
                        Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                let _ = msg_tx.send(invalid_input("Invalid message format")).await;
                                continue;
                            }
                        },
                        Some(Ok(Message::Binary(data))) => {
                            match BinaryAction::from_bytes(&data).ok().and_then(|a| a.to_client_message()) {
                                Some(m) => m,
                                None => {
                                    let _ = msg_tx.send(invalid_input("Invalid binary action")).await;
                                    continue;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error for {}: {}", addr, e);
                            break;
                        }
                        _ => continue,
                    };

                    if !Self::handle_client_message(&session, client_msg, &msg_tx).await {
                        break;
                    }
                }
                _ = shutdown_rx.recv() => {
                    let _ = msg_tx.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }

        // Cleanup
        relay_task.abort();
        drop(msg_tx);
        let _ = sender_task.await;

        sessions.remove_session(&session.id).await;
    }

    /// Handle a client message. Returns false when the client is leaving.
    async fn handle_client_message(
        session: &GameSession,
        msg: ClientMessage,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> bool {
        let reply = match msg {
            ClientMessage::PlaceBet { amount } => match session.place_bet(amount).await {
                Ok(round_id) => ServerMessage::BetAccepted {
                    round_id,
                    balance: session.balance().await,
                },
                Err(e) => {
                    debug!("Bet of {} rejected: {}", amount, e);
                    ServerMessage::Error(e.into())
                }
            },
            ClientMessage::CashOut => match session.cash_out().await {
                Ok(receipt) => ServerMessage::CashOutAccepted(receipt),
                Err(e) => {
                    debug!("Cash-out rejected: {}", e);
                    ServerMessage::Error(e.into())
                }
            },
            ClientMessage::Sync => ServerMessage::State(session.snapshot().await),
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: chrono::Utc::now().timestamp_millis() as u64,
            },
            ClientMessage::Leave => return false,
        };

        sender.send(reply).await.is_ok()
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}

fn invalid_input(message: &str) -> ServerMessage {
    ServerMessage::Error(ServerError {
        code: ErrorCode::InvalidInput,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::CrashEngine;
    use crate::game::target::{RoundTarget, ScriptedTargets, TargetGenerator};

    fn test_session() -> GameSession {
        let fallback = TargetGenerator::new(0, 1.01, 100.0);
        let targets = ScriptedTargets::new([RoundTarget::new(3.5, 10.0).unwrap()], fallback);
        let engine =
            CrashEngine::with_target_source(EngineConfig::default(), Box::new(targets)).unwrap();
        GameSession::new([1; 16], engine)
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.engine.initial_balance, 1000.0);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = ServerConfig::from_lookup(|key| match key {
            "CRASH_BIND_ADDR" => Some("127.0.0.1:9000".to_string()),
            "CRASH_INITIAL_BALANCE" => Some("50".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.engine.initial_balance, 50.0);
        assert_eq!(config.max_connections, 1000);
    }

    #[test]
    fn test_config_from_lookup_rejects_bad_values() {
        let err = ServerConfig::from_lookup(|key| {
            (key == "CRASH_MAX_CONNECTIONS").then(|| "lots".to_string())
        });
        assert!(matches!(err, Err(GameServerError::Config(_))));

        let err = ServerConfig::from_lookup(|key| {
            (key == "CRASH_INITIAL_BALANCE").then(|| "-10".to_string())
        });
        assert!(matches!(err, Err(GameServerError::Engine(ConfigError::InitialBalance(_)))));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config);

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_connection_limit_counts_pending_handshakes() {
        let server = GameServer::new(ServerConfig {
            max_connections: 2,
            ..Default::default()
        });
        let addr = |port| SocketAddr::from(([127, 0, 0, 1], port));

        assert!(server.reserve_slot(addr(4001)).await);
        assert!(server.reserve_slot(addr(4002)).await);
        assert!(!server.reserve_slot(addr(4003)).await);
        assert_eq!(server.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_failed_handshake_releases_slot() {
        let server = GameServer::new(ServerConfig {
            max_connections: 1,
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, addr) = listener.accept().await.unwrap();

        assert!(server.reserve_slot(addr).await);
        server.handle_connection(stream, addr);
        drop(client);

        for _ in 0..100 {
            if server.connection_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_place_bet_and_cash_out() {
        let session = test_session();
        let (tx, mut rx) = mpsc::channel(16);

        assert!(GameServer::handle_client_message(&session, ClientMessage::PlaceBet { amount: 10.0 }, &tx).await);
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::BetAccepted { balance, .. } if balance == 990.0
        ));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(GameServer::handle_client_message(&session, ClientMessage::CashOut, &tx).await);
        assert!(matches!(rx.recv().await.unwrap(), ServerMessage::CashOutAccepted(_)));

        assert!(GameServer::handle_client_message(&session, ClientMessage::CashOut, &tx).await);
        match rx.recv().await.unwrap() {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::IllegalAction),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handle_busy_and_invalid_wager() {
        let session = test_session();
        let (tx, mut rx) = mpsc::channel(16);

        GameServer::handle_client_message(&session, ClientMessage::PlaceBet { amount: 5000.0 }, &tx).await;
        match rx.recv().await.unwrap() {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::InvalidWager),
            other => panic!("unexpected {:?}", other),
        }

        GameServer::handle_client_message(&session, ClientMessage::PlaceBet { amount: 10.0 }, &tx).await;
        rx.recv().await.unwrap();
        GameServer::handle_client_message(&session, ClientMessage::PlaceBet { amount: 10.0 }, &tx).await;
        match rx.recv().await.unwrap() {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::EngineBusy),
            other => panic!("unexpected {:?}", other),
        }

        session.close().await;
    }

    #[tokio::test]
    async fn test_handle_sync_ping_leave() {
        let session = test_session();
        let (tx, mut rx) = mpsc::channel(16);

        assert!(GameServer::handle_client_message(&session, ClientMessage::Sync, &tx).await);
        match rx.recv().await.unwrap() {
            ServerMessage::State(snapshot) => {
                assert_eq!(snapshot.phase, Phase::Idle);
                assert_eq!(snapshot.balance, 1000.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(GameServer::handle_client_message(&session, ClientMessage::Ping { timestamp: 5 }, &tx).await);
        assert!(matches!(rx.recv().await.unwrap(), ServerMessage::Pong { timestamp: 5, .. }));

        assert!(!GameServer::handle_client_message(&session, ClientMessage::Leave, &tx).await);
    }
}
