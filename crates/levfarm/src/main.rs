use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use levfarm::config::{self, LevfarmConfig};
use levfarm::core::{Keeper, KeeperSettings, LeverageParams, PositionManager};
use levfarm::execution::{LendingMarket, SimulatedMarket, StaticBaseFee};
use levfarm::logging;
use levfarm::types::{amount_to_decimal, decimal_to_amount};

type SharedManager = Arc<Mutex<PositionManager<SimulatedMarket>>>;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("LEVFARM_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let config = config::load_config(&config_dir)?;

    // Hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;

    info!(
        asset = %config.strategy.asset.symbol,
        mode = %config.strategy.mode,
        poll_interval_seconds = config.keeper.poll_interval_seconds,
        "levfarm keeper starting"
    );

    // -----------------------------------------------------------------------
    // Component construction
    // -----------------------------------------------------------------------

    let decimals = config.strategy.asset.decimals;

    // 1. Market backend
    let mut market = SimulatedMarket::new(config.market.simulated(decimals)?);
    let initial_deposit = decimal_to_amount(config.keeper.initial_deposit, decimals)
        .context("initial_deposit is not representable in asset units")?;
    market.fund(initial_deposit);

    // 2. Position manager
    let mut manager = build_manager(&config, market)?;
    info!(
        target_ltv = %manager.params().target_ltv,
        max_borrow_ltv = %manager.params().max_borrow_ltv,
        max_ltv = %manager.params().max_ltv,
        "position manager ready"
    );

    // 3. Deploy the initial deposit
    let outcome = manager.invest().context("initial invest failed")?;
    info!(
        exit = ?outcome.exit,
        iterations = outcome.iterations,
        ltv = %outcome.position.ltv()?,
        total_assets = %amount_to_decimal(manager.estimated_total_assets()?, decimals),
        "initial invest complete"
    );

    let manager: SharedManager = Arc::new(Mutex::new(manager));
    let shutdown = CancellationToken::new();

    // 4. Keeper
    let keeper = Keeper::new(
        manager.clone(),
        Arc::new(StaticBaseFee::new(config.keeper.base_fee_gwei)),
        KeeperSettings::from(&config.keeper),
        shutdown.clone(),
    );

    // -----------------------------------------------------------------------
    // Launch concurrent tasks
    // -----------------------------------------------------------------------

    info!("spawning runtime tasks");

    let keeper_handle = tokio::spawn(async move {
        if let Err(e) = keeper.run().await {
            error!(error = %e, "keeper exited with error");
        }
    });

    let clock_handle = tokio::spawn(run_market_clock(
        manager.clone(),
        Duration::from_secs(config.keeper.poll_interval_seconds),
        config.keeper.ticks_per_poll,
        shutdown.clone(),
    ));

    info!("all tasks running, press Ctrl+C to shut down");

    // -----------------------------------------------------------------------
    // Wait for shutdown signal
    // -----------------------------------------------------------------------

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("shutdown signal received, stopping gracefully...");
    shutdown.cancel();

    let (keeper_res, clock_res) = tokio::join!(keeper_handle, clock_handle);
    if let Err(e) = keeper_res {
        error!(error = %e, "keeper task panicked");
    }
    if let Err(e) = clock_res {
        error!(error = %e, "market clock task panicked");
    }

    // Final harvest against the amount originally deposited.
    let mut manager = manager
        .lock()
        .map_err(|_| anyhow!("position manager lock poisoned"))?;
    let report = manager
        .harvest_and_report(initial_deposit)
        .context("final harvest failed")?;
    info!(
        total_assets = %amount_to_decimal(report.total_assets, decimals),
        profit = %amount_to_decimal(report.pnl.profit, decimals),
        loss = %amount_to_decimal(report.pnl.loss, decimals),
        "final report"
    );

    info!("shutdown complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Initialization helpers
// ---------------------------------------------------------------------------

/// Explicit ratios from `strategy.json` if given, otherwise derived from
/// the market's limits minus the configured margins.
fn build_manager(
    config: &LevfarmConfig,
    market: SimulatedMarket,
) -> Result<PositionManager<SimulatedMarket>> {
    let limits = config.strategy.operational_limits()?;
    let mode = config.strategy.mode;

    let manager = match config.strategy.explicit_ratios()? {
        Some((target, max_borrow, max)) => {
            let params = LeverageParams::new(target, max_borrow, max, &market.protocol_limits()?)
                .context("invalid leverage parameters")?;
            PositionManager::new(market, params, limits, mode)?
        }
        None => {
            let margins = config.strategy.safety_margins()?;
            PositionManager::with_derived_params(market, &margins, limits, mode)
                .context("failed to derive leverage parameters")?
        }
    };
    Ok(manager)
}

/// Advance simulated market time once per poll interval.
async fn run_market_clock(
    manager: SharedManager,
    interval: Duration,
    ticks: u64,
    shutdown: CancellationToken,
) {
    if ticks == 0 {
        return;
    }
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(interval) => {
                match manager.lock() {
                    Ok(mut m) => m.market_mut().advance(ticks),
                    Err(_) => {
                        error!("position manager lock poisoned, stopping market clock");
                        break;
                    }
                }
            }
        }
    }
}
