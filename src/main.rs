//! Crash Round Server
//!
//! `crash-round-server` serves rounds over WebSocket.
//! `crash-round-server demo [seed]` plays a few rounds headless and exits.

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crash_round::{
    VERSION,
    game::engine::{format_amount, format_multiplier, CrashEngine, EngineConfig},
    network::{GameServer, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Crash Round Server v{}", VERSION);

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("demo") {
        let seed = match args.next() {
            Some(s) => s.parse()?,
            None => 12345,
        };
        return demo_rounds(seed);
    }

    let config = ServerConfig::from_env()?;
    info!(
        "Balance {}, tick {}ms, cooldown {}ms",
        format_amount(config.engine.initial_balance),
        config.engine.tick_interval_ms(),
        config.engine.cooldown.as_millis()
    );

    let server = GameServer::new(config);
    server.run().await?;
    Ok(())
}

/// Play rounds without a clock, cashing out at a fixed multiplier.
fn demo_rounds(seed: u64) -> anyhow::Result<()> {
    const ROUNDS: u32 = 5;
    const STAKE: f64 = 10.0;
    const CASH_OUT_AT: f64 = 1.5;

    info!("=== Starting Demo ===");
    info!("Engine seed: {}", hex::encode(seed.to_le_bytes()));

    let mut engine = CrashEngine::with_seed(EngineConfig::default(), seed)?;

    for _ in 0..ROUNDS {
        let round_id = engine.place_bet(STAKE)?;
        engine.take_events();

        let mut ticks = 0u32;
        while let Some(result) = engine.tick(round_id) {
            ticks += 1;
            let multiplier = engine.round().map_or(1.0, |r| r.current_multiplier);
            let open = engine.round().map_or(false, |r| r.wager.is_open());

            if open && !result.crashed && multiplier >= CASH_OUT_AT {
                let payout = engine.cash_out()?;
                info!("Round {} cashed out at {} for {}", round_id, format_multiplier(multiplier), format_amount(payout));
            }
            if result.crashed {
                break;
            }
        }

        info!("Round {} ended after {} ticks, balance {}", round_id, ticks, format_amount(engine.balance()));

        engine.begin_reset(round_id);
        engine.begin_cooldown(round_id);
        engine.end_cooldown(round_id);
    }

    info!("=== Demo Results ===");
    for entry in engine.history() {
        info!(
            "Round {}: {:?} at {}, payout {}",
            entry.round_id,
            entry.outcome,
            format_multiplier(entry.multiplier),
            format_amount(entry.payout)
        );
    }

    let net = engine.balance() - engine.config().initial_balance;
    info!("Net: {}", format_amount(net));
    Ok(())
}
