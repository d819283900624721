//! Game Session and Round Scheduler
//!
//! A `GameSession` wraps one engine behind a lock, fans engine events out on
//! a broadcast channel and runs the round loop: fixed-period ticks until the
//! crash, then the display, reset and cooldown timers.
//!
//! Every engine call is made under the write lock, so ticks and player
//! actions never interleave. The loop is a task keyed by round id; a new
//! round aborts the previous task, and the engine ignores calls for any
//! round other than the live one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::game::engine::{ConfigError, CrashEngine, EngineConfig, EngineError, EngineSnapshot};
use crate::game::events::EngineEvent;
use crate::game::ledger::HistoryEntry;
use crate::game::round::{Phase, RoundId};
use crate::network::protocol::CashOutReceipt;

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Timers for one round, copied out of the engine config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTiming {
    /// Tick period.
    pub tick_interval: Duration,
    /// Crashed → Resetting delay.
    pub crash_display: Duration,
    /// Resetting → Cooldown delay.
    pub reset_delay: Duration,
    /// Cooldown → Idle delay.
    pub cooldown: Duration,
}

impl From<&EngineConfig> for RoundTiming {
    fn from(config: &EngineConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            crash_display: config.crash_display,
            reset_delay: config.reset_delay,
            cooldown: config.cooldown,
        }
    }
}

struct RoundTask {
    round_id: RoundId,
    handle: JoinHandle<()>,
}

/// One player's engine plus its scheduler.
pub struct GameSession {
    /// Unique session identifier.
    pub id: SessionId,
    engine: Arc<RwLock<CrashEngine>>,
    event_tx: broadcast::Sender<EngineEvent>,
    round_task: Mutex<Option<RoundTask>>,
}

impl GameSession {
    /// Wrap `engine` in a session.
    pub fn new(id: SessionId, engine: CrashEngine) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            id,
            engine: Arc::new(RwLock::new(engine)),
            event_tx,
            round_task: Mutex::new(None),
        }
    }

    /// Place a bet and start the round loop.
    pub async fn place_bet(&self, amount: f64) -> Result<RoundId, EngineError> {
        let (round_id, events, timing) = {
            let mut engine = self.engine.write().await;
            let round_id = engine.place_bet(amount)?;
            (round_id, engine.take_events(), RoundTiming::from(engine.config()))
        };

        publish(&self.event_tx, events);
        self.schedule(round_id, timing).await;

        Ok(round_id)
    }

    /// Cash out of the live round.
    pub async fn cash_out(&self) -> Result<CashOutReceipt, EngineError> {
        let (receipt, events) = {
            let mut engine = self.engine.write().await;
            let payout = engine.cash_out()?;
            let round = engine
                .round()
                .ok_or(EngineError::IllegalAction("no live round"))?;
            let receipt = CashOutReceipt {
                round_id: round.id,
                multiplier: round.wager.cash_out_multiplier().unwrap_or(round.current_multiplier),
                payout,
                balance: engine.balance(),
            };
            (receipt, engine.take_events())
        };

        publish(&self.event_tx, events);
        Ok(receipt)
    }

    async fn schedule(&self, round_id: RoundId, timing: RoundTiming) {
        let mut slot = self.round_task.lock().await;

        if let Some(previous) = slot.take() {
            debug!("Cancelling round loop {}", previous.round_id);
            previous.handle.abort();
        }

        let engine = self.engine.clone();
        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            run_round_loop(engine, event_tx, round_id, timing).await;
        });

        *slot = Some(RoundTask { round_id, handle });
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Full state snapshot.
    pub async fn snapshot(&self) -> EngineSnapshot {
        self.engine.read().await.snapshot()
    }

    /// Current balance.
    pub async fn balance(&self) -> f64 {
        self.engine.read().await.balance()
    }

    /// Current phase.
    pub async fn phase(&self) -> Phase {
        self.engine.read().await.phase()
    }

    /// Bet history.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.engine.read().await.history().to_vec()
    }

    /// Tick period, for the client greeting.
    pub async fn tick_interval(&self) -> Duration {
        self.engine.read().await.config().tick_interval
    }

    /// Stop the round loop, if any.
    pub async fn close(&self) {
        if let Some(task) = self.round_task.lock().await.take() {
            task.handle.abort();
        }
    }
}

fn publish(event_tx: &broadcast::Sender<EngineEvent>, events: Vec<EngineEvent>) {
    for event in events {
        // No subscribers is fine
        let _ = event_tx.send(event);
    }
}

/// Apply one timer transition; false when the round went stale.
async fn transition<F>(
    engine: &RwLock<CrashEngine>,
    event_tx: &broadcast::Sender<EngineEvent>,
    apply: F,
) -> bool
where
    F: FnOnce(&mut CrashEngine) -> Option<Vec<EngineEvent>>,
{
    let events = {
        let mut engine = engine.write().await;
        apply(&mut *engine)
    };

    match events {
        Some(events) => {
            publish(event_tx, events);
            true
        }
        None => false,
    }
}

/// Drive round `round_id` from its first tick back to Idle.
pub async fn run_round_loop(
    engine: Arc<RwLock<CrashEngine>>,
    event_tx: broadcast::Sender<EngineEvent>,
    round_id: RoundId,
    timing: RoundTiming,
) {
    // Phase 1: growth ticks
    let mut ticker = interval_at(Instant::now() + timing.tick_interval, timing.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let result = {
            let mut engine = engine.write().await;
            engine.tick(round_id)
        };

        let Some(result) = result else {
            debug!("Round {} loop stopped: stale", round_id);
            return;
        };

        let crashed = result.crashed;
        publish(&event_tx, result.events);

        if crashed {
            break;
        }
    }

    // Phase 2: crash display, reset, cooldown
    sleep(timing.crash_display).await;
    if !transition(&engine, &event_tx, |e| e.begin_reset(round_id)).await {
        return;
    }

    sleep(timing.reset_delay).await;
    if !transition(&engine, &event_tx, |e| e.begin_cooldown(round_id)).await {
        return;
    }

    sleep(timing.cooldown).await;
    if transition(&engine, &event_tx, |e| e.end_cooldown(round_id)).await {
        debug!("Round {} complete", round_id);
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Tracks the sessions of all connected clients.
pub struct SessionManager {
    sessions: RwLock<BTreeMap<SessionId, Arc<GameSession>>>,
    engine_config: EngineConfig,
}

impl SessionManager {
    /// Create a manager that builds engines from `engine_config`.
    pub fn new(engine_config: EngineConfig) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            engine_config,
        }
    }

    /// Create and register a session with a fresh engine.
    pub async fn create_session(&self) -> Result<Arc<GameSession>, ConfigError> {
        let id = uuid::Uuid::new_v4().into_bytes();
        let engine = CrashEngine::new(self.engine_config.clone())?;
        let session = Arc::new(GameSession::new(id, engine));

        self.sessions.write().await.insert(id, session.clone());
        info!("Session {} created", hex::encode(&id[..4]));

        Ok(session)
    }

    /// Close and remove a session.
    pub async fn remove_session(&self, id: &SessionId) {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = removed {
            session.close().await;
            info!("Session {} removed", hex::encode(&id[..4]));
        }
    }

    /// Active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every session.
    pub async fn close_all(&self) {
        let sessions: Vec<_> = {
            let mut guard = self.sessions.write().await;
            std::mem::take(&mut *guard).into_values().collect()
        };
        for session in sessions {
            session.close().await;
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::target::{RoundTarget, ScriptedTargets, TargetGenerator};

    fn scripted_session(targets: &[(f64, f64)]) -> GameSession {
        let targets = ScriptedTargets::new(
            targets.iter().map(|&(t, c)| RoundTarget::new(t, c).unwrap()),
            TargetGenerator::new(0, 1.01, 100.0),
        );
        let engine =
            CrashEngine::with_target_source(EngineConfig::default(), Box::new(targets)).unwrap();
        GameSession::new([0; 16], engine)
    }

    async fn next_event(rx: &mut broadcast::Receiver<EngineEvent>) -> EngineEvent {
        rx.recv().await.unwrap()
    }

    async fn wait_for<P>(rx: &mut broadcast::Receiver<EngineEvent>, mut pred: P) -> EngineEvent
    where
        P: FnMut(&EngineEvent) -> bool,
    {
        loop {
            let event = next_event(rx).await;
            if pred(&event) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_round_lifecycle() {
        let session = scripted_session(&[(3.5, 10.0)]);
        let mut rx = session.subscribe();
        let start = Instant::now();

        let round_id = session.place_bet(10.0).await.unwrap();
        assert_eq!(session.balance().await, 990.0);

        assert!(matches!(next_event(&mut rx).await, EngineEvent::BetPlaced { .. }));
        assert!(matches!(next_event(&mut rx).await, EngineEvent::RoundStarted { .. }));

        let mut ticks = 0;
        let crash = loop {
            match next_event(&mut rx).await {
                EngineEvent::Tick { .. } => ticks += 1,
                other => break other,
            }
        };
        assert_eq!(ticks, 36);
        assert_eq!(
            crash,
            EngineEvent::RoundCrashed { round_id, final_multiplier: 3.5, cashed_out: false }
        );
        assert_eq!(session.phase().await, Phase::Crashed);

        assert_eq!(next_event(&mut rx).await, EngineEvent::RoundReset { round_id });
        assert_eq!(next_event(&mut rx).await, EngineEvent::CooldownStarted { round_id });
        assert_eq!(next_event(&mut rx).await, EngineEvent::CooldownEnded { round_id });

        // 36 ticks of 50ms, 2s display, 1s cooldown
        assert!(start.elapsed() >= Duration::from_millis(36 * 50 + 2000 + 1000));
        assert_eq!(session.phase().await, Phase::Idle);
        assert_eq!(session.balance().await, 990.0);
        assert_eq!(session.history().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cash_out_keeps_climbing() {
        let session = scripted_session(&[(3.5, 10.0)]);
        let mut rx = session.subscribe();

        let round_id = session.place_bet(10.0).await.unwrap();
        wait_for(&mut rx, |e| matches!(e, EngineEvent::Tick { multiplier, .. } if *multiplier >= 2.0)).await;

        let receipt = session.cash_out().await.unwrap();
        assert_eq!(receipt.round_id, round_id);
        assert!((receipt.payout - 10.0 * receipt.multiplier).abs() < 1e-9);
        assert!((receipt.balance - (990.0 + receipt.payout)).abs() < 1e-9);

        assert!(matches!(next_event(&mut rx).await, EngineEvent::CashedOut { .. }));
        assert!(matches!(next_event(&mut rx).await, EngineEvent::Tick { .. }));

        let crash = wait_for(&mut rx, |e| matches!(e, EngineEvent::RoundCrashed { .. })).await;
        assert!(matches!(crash, EngineEvent::RoundCrashed { cashed_out: true, .. }));

        // Late cash-out is rejected, balance untouched
        assert!(matches!(session.cash_out().await, Err(EngineError::IllegalAction(_))));
        assert!((session.balance().await - receipt.balance).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bets_rejected_until_idle() {
        let session = scripted_session(&[(1.5, 2.0), (2.0, 3.0)]);
        let mut rx = session.subscribe();

        let first = session.place_bet(10.0).await.unwrap();
        assert_eq!(session.place_bet(5.0).await, Err(EngineError::EngineBusy(Phase::Flying)));

        wait_for(&mut rx, |e| matches!(e, EngineEvent::RoundCrashed { .. })).await;
        assert_eq!(session.place_bet(5.0).await, Err(EngineError::EngineBusy(Phase::Crashed)));

        wait_for(&mut rx, |e| matches!(e, EngineEvent::CooldownStarted { .. })).await;
        assert_eq!(session.place_bet(5.0).await, Err(EngineError::EngineBusy(Phase::Cooldown)));
        assert_eq!(session.balance().await, 990.0);

        wait_for(&mut rx, |e| matches!(e, EngineEvent::CooldownEnded { .. })).await;
        let second = session.place_bet(5.0).await.unwrap();
        assert_eq!(second, first.next());
        assert_eq!(session.balance().await, 985.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_ticking() {
        let session = scripted_session(&[(50.0, 60.0)]);
        session.place_bet(10.0).await.unwrap();

        sleep(Duration::from_millis(175)).await;
        session.close().await;
        let ticks = session.snapshot().await.round.unwrap().samples.len();

        sleep(Duration::from_secs(5)).await;
        let later = session.snapshot().await;
        assert_eq!(later.round.unwrap().samples.len(), ticks);
        assert_eq!(later.phase, Phase::Flying);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_loop_is_noop() {
        let session = scripted_session(&[(3.5, 10.0)]);
        let round_id = session.place_bet(10.0).await.unwrap();

        // A loop for a round that never existed must leave the live one alone
        let stale = tokio::spawn(run_round_loop(
            session.engine.clone(),
            session.event_tx.clone(),
            round_id.next(),
            RoundTiming::from(&EngineConfig::default()),
        ));
        stale.await.unwrap();

        assert_eq!(session.phase().await, Phase::Flying);
    }

    #[tokio::test]
    async fn test_session_manager() {
        let manager = SessionManager::default();

        let session = manager.create_session().await.unwrap();
        assert_eq!(manager.session_count().await, 1);

        manager.remove_session(&session.id).await;
        assert_eq!(manager.session_count().await, 0);

        // Removing twice is harmless
        manager.remove_session(&session.id).await;
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_manager_close_all() {
        let manager = SessionManager::default();
        manager.create_session().await.unwrap();
        manager.create_session().await.unwrap();

        manager.close_all().await;
        assert_eq!(manager.session_count().await, 0);
    }
}
