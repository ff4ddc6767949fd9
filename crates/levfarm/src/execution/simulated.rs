//! In-memory lending market.
//!
//! Models a single-asset money market closely enough to exercise the
//! leverage controllers end to end:
//! - Borrow ceiling enforced at the protocol max borrow ratio
//! - Withdrawals capped by pool liquidity and by the liquidation threshold
//! - Interest accrues per tick and is only applied by `live_position`
//!   (so `estimated_position` is genuinely stale between syncs)
//! - Reward accrual, claim and sale at a 1:1 asset value
//! - Optional flash-loan lever-up and repay-with-collateral
//!
//! Every mutating call is journaled with the resulting LTV, which the
//! controller tests use to check iteration-boundary invariants.

use alloy::primitives::U256;
use tracing::debug;

use crate::constants::WAD;
use crate::core::ltv_math;
use crate::errors::{LeverageError, LeverageResult};
use crate::types::{Position, ProtocolLimits, Wad};

use super::market::{LendingMarket, MarketCapabilities};

/// Static behaviour of a [`SimulatedMarket`].
#[derive(Debug, Clone)]
pub struct SimulatedMarketConfig {
    pub limits: ProtocolLimits,
    /// Pool cash available to withdrawals and new borrows.
    pub liquidity: U256,
    pub supply_rate_per_tick: Wad,
    pub borrow_rate_per_tick: Wad,
    /// Reward value (in asset units) accrued per tick.
    pub reward_per_tick: U256,
    pub flash_loan: bool,
    pub repay_with_collateral: bool,
}

impl SimulatedMarketConfig {
    /// Unlimited liquidity, no interest, no rewards, no atomic operations.
    pub fn new(limits: ProtocolLimits) -> Self {
        Self {
            limits,
            liquidity: U256::MAX,
            supply_rate_per_tick: Wad::ZERO,
            borrow_rate_per_tick: Wad::ZERO,
            reward_per_tick: U256::ZERO,
            flash_loan: false,
            repay_with_collateral: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketOp {
    Deposit,
    Withdraw,
    Borrow,
    Repay,
    FlashLever,
    RepayWithCollateral,
    ClaimRewards,
    SellRewards,
}

/// One journaled mutating call and the position it left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketCall {
    pub op: MarketOp,
    pub requested: U256,
    pub actual: U256,
    pub deposits: U256,
    pub borrows: U256,
    pub ltv_after: Wad,
}

pub struct SimulatedMarket {
    config: SimulatedMarketConfig,
    idle: U256,
    deposits: U256,
    borrows: U256,
    liquidity: U256,
    pending_ticks: u64,
    unclaimed_rewards: U256,
    claimed_rewards: U256,
    journal: Vec<MarketCall>,
    live_reads: usize,
}

impl SimulatedMarket {
    pub fn new(config: SimulatedMarketConfig) -> Self {
        let liquidity = config.liquidity;
        Self {
            config,
            idle: U256::ZERO,
            deposits: U256::ZERO,
            borrows: U256::ZERO,
            liquidity,
            pending_ticks: 0,
            unclaimed_rewards: U256::ZERO,
            claimed_rewards: U256::ZERO,
            journal: Vec::new(),
            live_reads: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Simulation controls
    // -----------------------------------------------------------------------

    /// Credit idle asset, as the vault layer does on a user deposit.
    pub fn fund(&mut self, amount: U256) {
        self.idle = self.idle.saturating_add(amount);
    }

    /// Pull idle asset out, as the vault layer does after freeing funds.
    pub fn take_idle(&mut self, amount: U256) -> LeverageResult<U256> {
        if amount > self.idle {
            return Err(LeverageError::InsufficientCollateral {
                requested: amount,
                available: self.idle,
            });
        }
        self.idle -= amount;
        Ok(amount)
    }

    /// Let `ticks` of time pass: rewards accrue now, interest on next sync.
    pub fn advance(&mut self, ticks: u64) {
        self.pending_ticks = self.pending_ticks.saturating_add(ticks);
        let reward = self
            .config
            .reward_per_tick
            .saturating_mul(U256::from(ticks));
        self.unclaimed_rewards = self.unclaimed_rewards.saturating_add(reward);
    }

    /// Raise debt without touching collateral (rate spike, bad debt socialisation).
    pub fn shock_borrows(&mut self, amount: U256) {
        self.borrows = self.borrows.saturating_add(amount);
    }

    pub fn set_liquidity(&mut self, liquidity: U256) {
        self.liquidity = liquidity;
    }

    pub fn journal(&self) -> &[MarketCall] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
        self.live_reads = 0;
    }

    /// Number of journaled mutating calls.
    pub fn mutating_calls(&self) -> usize {
        self.journal.len()
    }

    /// Number of `live_position` syncs.
    pub fn live_reads(&self) -> usize {
        self.live_reads
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn accrue(&mut self) {
        if self.pending_ticks == 0 {
            return;
        }
        let ticks = U256::from(self.pending_ticks);
        let supply_interest = self
            .deposits
            .saturating_mul(self.config.supply_rate_per_tick.raw())
            .saturating_mul(ticks)
            / WAD;
        let borrow_interest = self
            .borrows
            .saturating_mul(self.config.borrow_rate_per_tick.raw())
            .saturating_mul(ticks)
            / WAD;
        self.deposits = self.deposits.saturating_add(supply_interest);
        self.borrows = self.borrows.saturating_add(borrow_interest);
        self.pending_ticks = 0;
        debug!(
            supply_interest = %supply_interest,
            borrow_interest = %borrow_interest,
            "simulated market accrued interest"
        );
    }

    fn record(&mut self, op: MarketOp, requested: U256, actual: U256) {
        let ltv_after = ltv_math::ltv(self.deposits, self.borrows).unwrap_or(Wad(U256::MAX));
        self.journal.push(MarketCall {
            op,
            requested,
            actual,
            deposits: self.deposits,
            borrows: self.borrows,
            ltv_after,
        });
    }

    fn borrow_capacity(&self, deposits: U256) -> LeverageResult<U256> {
        ltv_math::borrow_from_deposit(deposits, self.config.limits.max_borrow_ratio)
    }
}

impl LendingMarket for SimulatedMarket {
    fn name(&self) -> &str {
        "simulated"
    }

    fn free_balance(&self) -> U256 {
        self.idle
    }

    fn deposit(&mut self, amount: U256) -> LeverageResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        if amount > self.idle {
            return Err(LeverageError::Market {
                reason: format!("deposit {amount} exceeds idle balance {}", self.idle),
            });
        }
        self.idle -= amount;
        self.deposits = self.deposits.saturating_add(amount);
        self.liquidity = self.liquidity.saturating_add(amount);
        self.record(MarketOp::Deposit, amount, amount);
        Ok(())
    }

    fn withdraw(&mut self, amount: U256) -> LeverageResult<U256> {
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        let healthy = ltv_math::excess_collateral(
            self.deposits,
            self.borrows,
            self.config.limits.liquidation_threshold,
        )?;
        let actual = amount.min(healthy).min(self.liquidity).min(self.deposits);
        self.deposits -= actual;
        self.liquidity -= actual;
        self.idle = self.idle.saturating_add(actual);
        self.record(MarketOp::Withdraw, amount, actual);
        Ok(actual)
    }

    fn borrow(&mut self, amount: U256) -> LeverageResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let new_borrows = self.borrows.saturating_add(amount);
        let capacity = self.borrow_capacity(self.deposits)?;
        if new_borrows > capacity {
            return Err(LeverageError::Market {
                reason: format!("borrow {amount} exceeds capacity {capacity}"),
            });
        }
        if amount > self.liquidity {
            return Err(LeverageError::Market {
                reason: format!("borrow {amount} exceeds pool liquidity {}", self.liquidity),
            });
        }
        self.borrows = new_borrows;
        self.liquidity -= amount;
        self.idle = self.idle.saturating_add(amount);
        self.record(MarketOp::Borrow, amount, amount);
        Ok(())
    }

    fn repay(&mut self, amount: U256) -> LeverageResult<U256> {
        let actual = amount.min(self.idle).min(self.borrows);
        if actual.is_zero() {
            return Ok(U256::ZERO);
        }
        self.idle -= actual;
        self.borrows -= actual;
        self.liquidity = self.liquidity.saturating_add(actual);
        self.record(MarketOp::Repay, amount, actual);
        Ok(actual)
    }

    fn estimated_position(&self) -> LeverageResult<Position> {
        Ok(Position::new(self.deposits, self.borrows))
    }

    fn live_position(&mut self) -> LeverageResult<Position> {
        self.live_reads += 1;
        self.accrue();
        Ok(Position::new(self.deposits, self.borrows))
    }

    fn protocol_limits(&self) -> LeverageResult<ProtocolLimits> {
        Ok(self.config.limits)
    }

    fn claim_rewards(&mut self) -> LeverageResult<()> {
        let amount = std::mem::take(&mut self.unclaimed_rewards);
        if amount.is_zero() {
            return Ok(());
        }
        self.claimed_rewards = self.claimed_rewards.saturating_add(amount);
        self.record(MarketOp::ClaimRewards, amount, amount);
        Ok(())
    }

    fn pending_reward_value(&self) -> U256 {
        self.unclaimed_rewards.saturating_add(self.claimed_rewards)
    }

    fn sell_rewards(&mut self) -> LeverageResult<U256> {
        let amount = std::mem::take(&mut self.claimed_rewards);
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        self.idle = self.idle.saturating_add(amount);
        self.record(MarketOp::SellRewards, amount, amount);
        Ok(amount)
    }

    fn capabilities(&self) -> MarketCapabilities {
        MarketCapabilities {
            flash_loan: self.config.flash_loan,
            repay_with_collateral: self.config.repay_with_collateral,
        }
    }

    fn flash_lever(&mut self, amount: U256) -> LeverageResult<()> {
        if !self.config.flash_loan {
            return Err(LeverageError::Unsupported {
                operation: "flash_lever",
            });
        }
        if amount > self.liquidity {
            return Err(LeverageError::Market {
                reason: format!("flash loan {amount} exceeds pool liquidity {}", self.liquidity),
            });
        }
        let new_deposits = self.deposits.saturating_add(self.idle).saturating_add(amount);
        let new_borrows = self.borrows.saturating_add(amount);
        let capacity = self.borrow_capacity(new_deposits)?;
        if new_borrows > capacity {
            return Err(LeverageError::Market {
                reason: format!("flash lever {amount} exceeds capacity {capacity}"),
            });
        }
        self.liquidity = self.liquidity.saturating_add(self.idle);
        self.deposits = new_deposits;
        self.borrows = new_borrows;
        self.idle = U256::ZERO;
        self.record(MarketOp::FlashLever, amount, amount);
        Ok(())
    }

    fn repay_with_collateral(&mut self, amount: U256) -> LeverageResult<U256> {
        if !self.config.repay_with_collateral {
            return Err(LeverageError::Unsupported {
                operation: "repay_with_collateral",
            });
        }
        let actual = amount.min(self.borrows).min(self.deposits);
        if actual.is_zero() {
            return Ok(U256::ZERO);
        }
        self.deposits -= actual;
        self.borrows -= actual;
        self.record(MarketOp::RepayWithCollateral, amount, actual);
        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ProtocolLimits {
        ProtocolLimits {
            max_borrow_ratio: Wad::from_bps(7500),
            liquidation_threshold: Wad::from_bps(8000),
        }
    }

    fn funded(amount: u64) -> SimulatedMarket {
        let mut m = SimulatedMarket::new(SimulatedMarketConfig::new(limits()));
        m.fund(U256::from(amount));
        m
    }

    #[test]
    fn test_deposit_moves_idle_to_collateral() {
        let mut m = funded(1000);
        m.deposit(U256::from(600u64)).unwrap();
        assert_eq!(m.free_balance(), U256::from(400u64));
        assert_eq!(m.estimated_position().unwrap().deposits, U256::from(600u64));
        assert_eq!(m.mutating_calls(), 1);
    }

    #[test]
    fn test_zero_amounts_are_noops() {
        let mut m = funded(1000);
        m.deposit(U256::ZERO).unwrap();
        m.borrow(U256::ZERO).unwrap();
        assert_eq!(m.withdraw(U256::ZERO).unwrap(), U256::ZERO);
        assert_eq!(m.repay(U256::ZERO).unwrap(), U256::ZERO);
        assert_eq!(m.mutating_calls(), 0);
    }

    #[test]
    fn test_borrow_above_protocol_ceiling_rejected() {
        let mut m = funded(1000);
        m.deposit(U256::from(1000u64)).unwrap();
        assert!(m.borrow(U256::from(750u64)).is_ok());
        let err = m.borrow(U256::from(1u64)).unwrap_err();
        assert!(err.to_string().contains("exceeds capacity"));
    }

    #[test]
    fn test_withdraw_capped_by_liquidation_threshold() {
        let mut m = funded(1000);
        m.deposit(U256::from(1000u64)).unwrap();
        m.borrow(U256::from(400u64)).unwrap();
        // 400 / 0.8 = 500 required (+1 headroom) → at most 499 can leave.
        let got = m.withdraw(U256::from(900u64)).unwrap();
        assert_eq!(got, U256::from(499u64));
    }

    #[test]
    fn test_withdraw_capped_by_liquidity() {
        let mut m = funded(1000);
        m.deposit(U256::from(1000u64)).unwrap();
        m.set_liquidity(U256::from(300u64));
        assert_eq!(m.withdraw(U256::from(800u64)).unwrap(), U256::from(300u64));
    }

    #[test]
    fn test_interest_applies_only_on_live_sync() {
        let mut config = SimulatedMarketConfig::new(limits());
        config.borrow_rate_per_tick = Wad::from_bps(100);
        let mut m = SimulatedMarket::new(config);
        m.fund(U256::from(10_000u64));
        m.deposit(U256::from(10_000u64)).unwrap();
        m.borrow(U256::from(5_000u64)).unwrap();
        m.advance(2);

        assert_eq!(m.estimated_position().unwrap().borrows, U256::from(5_000u64));
        assert_eq!(m.live_position().unwrap().borrows, U256::from(5_100u64));
        assert_eq!(m.estimated_position().unwrap().borrows, U256::from(5_100u64));
    }

    #[test]
    fn test_rewards_claim_and_sell() {
        let mut config = SimulatedMarketConfig::new(limits());
        config.reward_per_tick = U256::from(7u64);
        let mut m = SimulatedMarket::new(config);
        m.advance(3);
        assert_eq!(m.pending_reward_value(), U256::from(21u64));
        m.claim_rewards().unwrap();
        assert_eq!(m.pending_reward_value(), U256::from(21u64));
        assert_eq!(m.sell_rewards().unwrap(), U256::from(21u64));
        assert_eq!(m.free_balance(), U256::from(21u64));
        assert!(m.pending_reward_value().is_zero());
    }

    #[test]
    fn test_flash_lever_disabled_by_default() {
        let mut m = funded(1000);
        assert!(matches!(
            m.flash_lever(U256::from(100u64)),
            Err(LeverageError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_flash_lever_deposits_idle_and_loan() {
        let mut config = SimulatedMarketConfig::new(limits());
        config.flash_loan = true;
        let mut m = SimulatedMarket::new(config);
        m.fund(U256::from(1000u64));
        m.flash_lever(U256::from(2000u64)).unwrap();
        let p = m.estimated_position().unwrap();
        assert_eq!(p.deposits, U256::from(3000u64));
        assert_eq!(p.borrows, U256::from(2000u64));
        assert!(m.free_balance().is_zero());
    }

    #[test]
    fn test_repay_with_collateral() {
        let mut config = SimulatedMarketConfig::new(limits());
        config.repay_with_collateral = true;
        let mut m = SimulatedMarket::new(config);
        m.fund(U256::from(1000u64));
        m.deposit(U256::from(1000u64)).unwrap();
        m.borrow(U256::from(600u64)).unwrap();
        let repaid = m.repay_with_collateral(U256::from(10_000u64)).unwrap();
        assert_eq!(repaid, U256::from(600u64));
        let p = m.estimated_position().unwrap();
        assert_eq!(p.deposits, U256::from(400u64));
        assert!(p.borrows.is_zero());
    }

    #[test]
    fn test_take_idle_insufficient() {
        let mut m = funded(50);
        let err = m.take_idle(U256::from(80u64)).unwrap_err();
        assert_eq!(
            err,
            LeverageError::InsufficientCollateral {
                requested: U256::from(80u64),
                available: U256::from(50u64),
            }
        );
    }
}
