//! Keeper loop: polls the tend trigger and rebalances when it says so.
//!
//! - Fixed poll interval, graceful shutdown via CancellationToken
//! - Position manager behind a std mutex; the lock is only held inside a
//!   synchronous tick, never across an await
//! - N consecutive failed ticks shut the position down (no further lever-up)

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::KeeperConfig;
use crate::execution::{BaseFeeSource, LendingMarket};

use super::position_manager::PositionManager;
use super::tend::TendDecision;

#[derive(Debug, Clone, Copy)]
pub struct KeeperSettings {
    pub poll_interval: Duration,
    pub max_consecutive_failures: u32,
}

impl From<&KeeperConfig> for KeeperSettings {
    fn from(config: &KeeperConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

pub struct Keeper<M: LendingMarket> {
    manager: Arc<Mutex<PositionManager<M>>>,
    base_fee: Arc<dyn BaseFeeSource>,
    settings: KeeperSettings,
    shutdown: CancellationToken,
    consecutive_failures: AtomicU32,
    tends: AtomicU64,
}

impl<M: LendingMarket> Keeper<M> {
    pub fn new(
        manager: Arc<Mutex<PositionManager<M>>>,
        base_fee: Arc<dyn BaseFeeSource>,
        settings: KeeperSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manager,
            base_fee,
            settings,
            shutdown,
            consecutive_failures: AtomicU32::new(0),
            tends: AtomicU64::new(0),
        }
    }

    /// Number of ticks that ran a tend.
    pub fn tends(&self) -> u64 {
        self.tends.load(Ordering::Relaxed)
    }

    /// Main polling loop. Runs until the CancellationToken is cancelled.
    pub async fn run(&self) -> Result<()> {
        info!(
            poll_interval = ?self.settings.poll_interval,
            "keeper started"
        );

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!(tends = self.tends(), "keeper shutting down");
                    break;
                }
                () = tokio::time::sleep(self.settings.poll_interval) => {
                    match self.tick() {
                        Ok(_) => {
                            self.consecutive_failures.store(0, Ordering::Relaxed);
                        }
                        Err(e) => {
                            let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                            error!(
                                error = %e,
                                consecutive_failures = failures,
                                "keeper tick failed"
                            );
                            if failures == self.settings.max_consecutive_failures {
                                error!(
                                    "reached {failures} consecutive failures, shutting position down"
                                );
                                self.shutdown_position()?;
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// One evaluation: read the trigger, tend if it says act.
    pub fn tick(&self) -> Result<TendDecision> {
        let base_fee = self
            .base_fee
            .base_fee_gwei()
            .context("failed to read base fee")?;

        let mut manager = self
            .manager
            .lock()
            .map_err(|_| anyhow!("position manager lock poisoned"))?;

        let decision = manager
            .tend_trigger(base_fee)
            .context("tend trigger evaluation failed")?;
        if !decision.should_act() {
            debug!(reason = ?decision.reason(), base_fee, "tend skipped");
            return Ok(decision);
        }

        let outcome = manager.tend().context("tend failed")?;
        self.tends.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Some(out) if !out.reached_target() => warn!(
                reason = ?decision.reason(),
                exit = ?out.exit,
                iterations = out.iterations,
                remaining = %out.remaining,
                "tend stopped short of target"
            ),
            Some(out) => info!(
                reason = ?decision.reason(),
                exit = ?out.exit,
                iterations = out.iterations,
                moved = %out.moved,
                "tend complete"
            ),
            None => info!(reason = ?decision.reason(), "tend made no change"),
        }
        Ok(decision)
    }

    fn shutdown_position(&self) -> Result<()> {
        let mut manager = self
            .manager
            .lock()
            .map_err(|_| anyhow!("position manager lock poisoned"))?;
        manager.shutdown();
        Ok(())
    }
}
