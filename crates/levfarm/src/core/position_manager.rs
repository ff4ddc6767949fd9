//! Position manager for a single leveraged lending position.
//!
//! Orchestrates the operator-facing verbs by composing the oracle, the LTV
//! math and the two leverage controllers:
//! 1. `invest`: deploy idle asset, lever up to target
//! 2. `free_funds`: release asset for a withdrawal, keeping the target ratio
//! 3. `harvest_and_report`: sell rewards, rebalance, report profit/loss
//! 4. `emergency_withdraw`: full unwind to zero debt, then withdraw
//!
//! All calls run to completion against an exclusively owned market; the
//! keeper serialises access from the async side.

use alloy::primitives::U256;
use tracing::{info, warn};

use crate::errors::{LeverageError, LeverageResult};
use crate::execution::LendingMarket;
use crate::types::{
    FreeOutcome, HarvestReport, LeverageMode, LoopOutcome, PositionSnapshot, ProfitAndLoss, Wad,
};

use super::lever_down::{lever_down, withdraw_excess, Unwind};
use super::lever_up::lever_up;
use super::ltv_math;
use super::oracle;
use super::params::{LeverageParams, OperationalLimits, SafetyMargins};
use super::tend::{self, is_over_levered, is_under_levered, TendDecision, TendInputs};

pub struct PositionManager<M: LendingMarket> {
    market: M,
    params: LeverageParams,
    limits: OperationalLimits,
    mode: LeverageMode,
    is_shutdown: bool,
}

impl<M: LendingMarket> PositionManager<M> {
    /// Construct with explicit parameters, validated against the market's
    /// published limits.
    pub fn new(
        market: M,
        params: LeverageParams,
        limits: OperationalLimits,
        mode: LeverageMode,
    ) -> LeverageResult<Self> {
        params.validate(&market.protocol_limits()?)?;
        limits.validate()?;
        Ok(Self {
            market,
            params,
            limits,
            mode,
            is_shutdown: false,
        })
    }

    /// Construct with parameters derived from the market's limits.
    pub fn with_derived_params(
        market: M,
        margins: &SafetyMargins,
        limits: OperationalLimits,
        mode: LeverageMode,
    ) -> LeverageResult<Self> {
        let params = LeverageParams::derive(&market.protocol_limits()?, margins)?;
        info!(
            target_ltv = %params.target_ltv,
            max_borrow_ltv = %params.max_borrow_ltv,
            max_ltv = %params.max_ltv,
            "derived leverage parameters from market limits"
        );
        Self::new(market, params, limits, mode)
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    pub fn params(&self) -> &LeverageParams {
        &self.params
    }

    pub fn limits(&self) -> &OperationalLimits {
        &self.limits
    }

    pub fn mode(&self) -> LeverageMode {
        self.mode
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    pub fn market(&self) -> &M {
        &self.market
    }

    pub fn market_mut(&mut self) -> &mut M {
        &mut self.market
    }

    /// Authoritative position. Syncs the market.
    pub fn live_position(&mut self) -> LeverageResult<PositionSnapshot> {
        oracle::live(&mut self.market)
    }

    pub fn live_ltv(&mut self) -> LeverageResult<Wad> {
        self.live_position()?.ltv()
    }

    /// Idle balance plus net position plus haircut reward value. Read-only.
    pub fn estimated_total_assets(&self) -> LeverageResult<U256> {
        let snap = oracle::estimated(&self.market)?;
        let rewards = self.limits.haircut(self.market.pending_reward_value());
        Ok(snap.real_supply()?.saturating_add(rewards))
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Replace the leverage parameters. Rejected updates leave the current
    /// parameters in place.
    pub fn set_leverage_params(
        &mut self,
        target_ltv: Wad,
        max_borrow_ltv: Wad,
        max_ltv: Wad,
    ) -> LeverageResult<()> {
        let limits = self.market.protocol_limits()?;
        let params = LeverageParams::new(target_ltv, max_borrow_ltv, max_ltv, &limits)?;
        info!(
            target_ltv = %params.target_ltv,
            max_borrow_ltv = %params.max_borrow_ltv,
            max_ltv = %params.max_ltv,
            "leverage parameters updated"
        );
        self.params = params;
        Ok(())
    }

    pub fn set_limits(&mut self, limits: OperationalLimits) -> LeverageResult<()> {
        limits.validate()?;
        self.limits = limits;
        Ok(())
    }

    pub fn set_leverage_mode(&mut self, mode: LeverageMode) {
        info!(from = %self.mode, to = %mode, "leverage mode changed");
        self.mode = mode;
    }

    /// Stop levering up. Rebalancing down and withdrawals still work.
    pub fn shutdown(&mut self) {
        if !self.is_shutdown {
            warn!(market = self.market.name(), "position manager shut down");
            self.is_shutdown = true;
        }
    }

    // -----------------------------------------------------------------------
    // Verbs
    // -----------------------------------------------------------------------

    /// Deploy the idle balance and lever up if under the band.
    pub fn invest(&mut self) -> LeverageResult<LoopOutcome> {
        if self.is_shutdown {
            return Err(LeverageError::Shutdown);
        }
        let free = self.market.free_balance();
        self.market.deposit(free)?;
        lever_up(&mut self.market, &self.params, &self.limits, self.mode)
    }

    /// Release `amount` of asset into the idle balance for the vault layer.
    ///
    /// Illiquidity is not an error: whatever could not be released is
    /// returned as `loss`.
    pub fn free_funds(&mut self, amount: U256) -> LeverageResult<FreeOutcome> {
        if amount.is_zero() {
            return Ok(FreeOutcome::new(U256::ZERO, U256::ZERO));
        }
        let snap = oracle::live(&mut self.market)?;
        let idle_before = snap.free_balance;

        if snap.borrows.is_zero() {
            let wanted = amount.min(snap.deposits);
            if !wanted.is_zero() {
                self.market.withdraw(wanted)?;
            }
        } else {
            let remaining_supply = snap.net_position()?.saturating_sub(amount);
            let new_borrow = ltv_math::borrow_from_supply(remaining_supply, self.params.target_ltv)?;
            if new_borrow < snap.borrows {
                lever_down(
                    &mut self.market,
                    &self.params,
                    &self.limits,
                    self.mode,
                    new_borrow,
                    Unwind::Partial,
                )?;
                withdraw_excess(&mut self.market, self.params.target_ltv, U256::MAX)?;
            } else {
                withdraw_excess(&mut self.market, self.params.max_ltv, amount)?;
            }
        }

        let mut freed = self.market.free_balance().saturating_sub(idle_before);
        if freed < amount {
            // One best-effort pass against the risk ceiling; the rest is loss.
            withdraw_excess(&mut self.market, self.params.max_ltv, amount - freed)?;
            freed = self.market.free_balance().saturating_sub(idle_before);
        }

        let outcome = FreeOutcome::new(amount, freed);
        if outcome.is_partial() {
            warn!(
                requested = %amount,
                freed = %outcome.freed,
                loss = %outcome.loss,
                "free funds shortfall"
            );
        } else {
            info!(requested = %amount, freed = %outcome.freed, "funds freed");
        }
        Ok(outcome)
    }

    /// Rebalance toward the target. `None` when nothing needed doing.
    pub fn tend(&mut self) -> LeverageResult<Option<LoopOutcome>> {
        let snap = oracle::live(&mut self.market)?;
        if snap.gross_assets().is_zero() {
            return Ok(None);
        }
        let ltv = snap.ltv()?;

        if ltv >= self.params.max_ltv || is_over_levered(ltv, &self.params, &self.limits) {
            let target_borrow =
                ltv_math::borrow_from_supply(snap.real_supply()?, self.params.target_ltv)?;
            info!(ltv = %ltv, target_borrow = %target_borrow, "tend: levering down");
            return lever_down(
                &mut self.market,
                &self.params,
                &self.limits,
                self.mode,
                target_borrow,
                Unwind::Partial,
            )
            .map(Some);
        }
        if self.is_shutdown {
            return Ok(None);
        }
        if is_under_levered(ltv, &self.params, &self.limits) {
            info!(ltv = %ltv, "tend: levering up");
            return lever_up(&mut self.market, &self.params, &self.limits, self.mode).map(Some);
        }
        if snap.free_balance > self.limits.min_asset {
            self.market.deposit(snap.free_balance)?;
        }
        Ok(None)
    }

    /// Whether the keeper should call [`Self::tend`] now. Never mutates.
    pub fn tend_trigger(&self, base_fee_gwei: u64) -> LeverageResult<TendDecision> {
        let snap = oracle::estimated(&self.market)?;
        let limits = self.market.protocol_limits()?;
        let inputs = TendInputs {
            gross_assets: snap.gross_assets(),
            estimated_ltv: snap.ltv()?,
            liquidation_threshold: limits.liquidation_threshold,
            base_fee_gwei,
            is_shutdown: self.is_shutdown,
        };
        Ok(tend::evaluate(&inputs, &self.params, &self.limits))
    }

    /// Claim and sell rewards, rebalance, then report against the previous
    /// total-asset reading.
    pub fn harvest_and_report(
        &mut self,
        previous_total_assets: U256,
    ) -> LeverageResult<HarvestReport> {
        self.market.claim_rewards()?;
        let reward_value = self.market.pending_reward_value();
        let rewards_sold = if !reward_value.is_zero() && reward_value >= self.limits.min_reward_sell {
            self.market.sell_rewards()?
        } else {
            U256::ZERO
        };

        self.tend()?;

        let total_assets = oracle::live(&mut self.market)?.real_supply()?;
        let pnl = ProfitAndLoss::between(previous_total_assets, total_assets);
        info!(
            total_assets = %total_assets,
            rewards_sold = %rewards_sold,
            profit = %pnl.profit,
            loss = %pnl.loss,
            "harvest report"
        );
        Ok(HarvestReport {
            total_assets,
            rewards_sold,
            pnl,
        })
    }

    /// Shut down, repay all debt, then withdraw up to `amount`.
    ///
    /// Collateral the unwind withdrew but did not spend on repayment already
    /// sits in the free balance and counts toward `amount`.
    pub fn emergency_withdraw(&mut self, amount: U256) -> LeverageResult<FreeOutcome> {
        self.shutdown();
        let idle_before = self.market.free_balance();
        let unwound = lever_down(
            &mut self.market,
            &self.params,
            &self.limits,
            self.mode,
            U256::ZERO,
            Unwind::Full,
        )?;
        if !unwound.position.borrows.is_zero() {
            warn!(
                borrows = %unwound.position.borrows,
                exit = ?unwound.exit,
                "emergency unwind left debt outstanding"
            );
        }

        let released = self.market.free_balance().saturating_sub(idle_before);
        let withdrawn = if released < amount {
            withdraw_excess(&mut self.market, self.params.max_ltv, amount - released)?
        } else {
            U256::ZERO
        };
        let freed = self
            .market
            .free_balance()
            .saturating_sub(idle_before)
            .min(amount);
        let outcome = FreeOutcome::new(amount, freed);
        warn!(
            requested = %amount,
            released_by_unwind = %released,
            withdrawn = %withdrawn,
            loss = %outcome.loss,
            "emergency withdraw complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WAD;
    use crate::core::tend::TendReason;
    use crate::execution::{MarketOp, SimulatedMarket, SimulatedMarketConfig};
    use crate::types::{LoopExit, ProtocolLimits};
    use rust_decimal_macros::dec;

    fn wad(d: rust_decimal::Decimal) -> Wad {
        Wad::from_decimal(d).unwrap()
    }

    fn units(n: u64) -> U256 {
        U256::from(n) * WAD
    }

    fn protocol() -> ProtocolLimits {
        ProtocolLimits {
            max_borrow_ratio: wad(dec!(0.75)),
            liquidation_threshold: wad(dec!(0.80)),
        }
    }

    fn params() -> LeverageParams {
        LeverageParams::new(wad(dec!(0.70)), wad(dec!(0.72)), wad(dec!(0.77)), &protocol()).unwrap()
    }

    fn limits() -> OperationalLimits {
        OperationalLimits {
            max_iterations: 12,
            min_asset: U256::from(100u64),
            ..Default::default()
        }
    }

    fn manager_with(config: SimulatedMarketConfig, funded: u64) -> PositionManager<SimulatedMarket> {
        let mut market = SimulatedMarket::new(config);
        market.fund(units(funded));
        PositionManager::new(market, params(), limits(), LeverageMode::Iterative).unwrap()
    }

    fn manager(funded: u64) -> PositionManager<SimulatedMarket> {
        manager_with(SimulatedMarketConfig::new(protocol()), funded)
    }

    fn abs_diff(a: U256, b: U256) -> U256 {
        if a > b {
            a - b
        } else {
            b - a
        }
    }

    #[test]
    fn test_invest_then_free_half() {
        let mut pm = manager(100_000);
        let out = pm.invest().unwrap();
        assert_eq!(out.exit, LoopExit::Converged);
        assert!(out.iterations <= 12);
        let ltv = pm.live_ltv().unwrap();
        assert!(ltv <= params().target_ltv);
        assert!(params().target_ltv.raw() - ltv.raw() <= U256::from(100u64));

        let freed = pm.free_funds(units(50_000)).unwrap();
        assert!(!freed.is_partial());
        assert!(freed.freed >= units(50_000));
        pm.market_mut().take_idle(freed.freed).unwrap();

        let snap = pm.live_position().unwrap();
        let ltv = snap.ltv().unwrap();
        assert!(abs_diff(ltv.raw(), params().target_ltv.raw()) <= U256::from(1_000_000u64));
        assert!(abs_diff(snap.real_supply().unwrap(), units(50_000)) <= units(1));
    }

    #[test]
    fn test_invest_in_band_makes_no_market_calls() {
        let mut pm = manager(100_000);
        pm.invest().unwrap();
        pm.market_mut().clear_journal();

        let out = pm.invest().unwrap();
        assert_eq!(out.exit, LoopExit::NoAction);
        assert_eq!(pm.market().mutating_calls(), 0);
    }

    #[test]
    fn test_invest_atomic_single_call() {
        let mut config = SimulatedMarketConfig::new(protocol());
        config.flash_loan = true;
        let mut pm = manager_with(config, 100_000);
        pm.set_leverage_mode(LeverageMode::Atomic);

        // Idle is deposited first, then one flash lever.
        pm.invest().unwrap();
        let ops: Vec<MarketOp> = pm.market().journal().iter().map(|c| c.op).collect();
        assert_eq!(ops, vec![MarketOp::Deposit, MarketOp::FlashLever]);
    }

    #[test]
    fn test_free_without_debt() {
        let mut pm = manager(1_000);
        let free = pm.market().free_balance();
        pm.market_mut().deposit(free).unwrap();

        let out = pm.free_funds(units(400)).unwrap();
        assert_eq!(out.freed, units(400));
        assert!(out.loss.is_zero());
    }

    #[test]
    fn test_free_shortfall_is_loss_not_error() {
        let mut pm = manager(1_000);
        let free = pm.market().free_balance();
        pm.market_mut().deposit(free).unwrap();
        pm.market_mut().set_liquidity(units(150));

        let out = pm.free_funds(units(400)).unwrap();
        assert_eq!(out.freed, units(150));
        assert_eq!(out.loss, units(250));
    }

    #[test]
    fn test_full_lifecycle_returns_to_near_zero() {
        let mut config = SimulatedMarketConfig::new(protocol());
        config.supply_rate_per_tick = Wad::from_raw(U256::from(1_000_000_000u64));
        config.borrow_rate_per_tick = Wad::from_raw(U256::from(500_000_000u64));
        let mut pm = manager_with(config, 10_000);
        pm.invest().unwrap();
        pm.market_mut().advance(7_200);

        let net = pm.live_position().unwrap().real_supply().unwrap();
        let out = pm.free_funds(net).unwrap();
        assert!(!out.is_partial());

        let snap = pm.live_position().unwrap();
        assert!(snap.borrows <= U256::from(100u64));
    }

    #[test]
    fn test_emergency_repays_before_withdrawing() {
        let mut pm = manager(1_000);
        {
            let m = pm.market_mut();
            m.deposit(units(1_000)).unwrap();
            m.borrow(units(400)).unwrap();
            m.take_idle(units(400)).unwrap();
            m.clear_journal();
        }

        let out = pm.emergency_withdraw(units(500)).unwrap();
        assert!(pm.is_shutdown());
        assert_eq!(out.freed, units(500));

        let journal = pm.market().journal();
        let last = journal.last().unwrap();
        assert_eq!(last.op, MarketOp::Withdraw);
        assert!(last.borrows.is_zero());
        let last_repay = journal.iter().rposition(|c| c.op == MarketOp::Repay).unwrap();
        assert!(journal[last_repay].borrows.is_zero());
    }

    #[test]
    fn test_emergency_counts_collateral_released_by_unwind() {
        let mut pm = manager(100_000);
        pm.invest().unwrap();
        let invested = pm.live_position().unwrap();
        assert!(!invested.borrows.is_zero());
        let net = invested.net_position().unwrap();

        let out = pm.emergency_withdraw(net).unwrap();
        assert!(out.loss.is_zero(), "loss {}", out.loss);
        assert_eq!(out.freed, net);

        let snap = pm.live_position().unwrap();
        assert!(snap.borrows.is_zero());
        assert!(snap.deposits.is_zero());
        assert_eq!(snap.free_balance, units(100_000));
    }

    #[test]
    fn test_emergency_partial_request_leaves_rest_deposited() {
        let mut pm = manager(100_000);
        pm.invest().unwrap();

        let out = pm.emergency_withdraw(units(10_000)).unwrap();
        assert!(out.loss.is_zero());
        assert_eq!(out.freed, units(10_000));

        let snap = pm.live_position().unwrap();
        assert!(snap.borrows.is_zero());
        assert!(snap.free_balance >= units(10_000));
        assert_eq!(snap.real_supply().unwrap(), units(100_000));
    }

    #[test]
    fn test_shutdown_blocks_invest() {
        let mut pm = manager(1_000);
        pm.shutdown();
        assert_eq!(pm.invest().unwrap_err(), LeverageError::Shutdown);
    }

    #[test]
    fn test_tend_trigger_quiet_through_normal_lifecycle() {
        let mut pm = manager(0);
        assert_eq!(pm.tend_trigger(10).unwrap(), TendDecision::Skip(TendReason::NoAssets));

        pm.market_mut().fund(units(10_000));
        pm.invest().unwrap();
        assert!(!pm.tend_trigger(10).unwrap().should_act());

        pm.harvest_and_report(units(10_000)).unwrap();
        assert!(!pm.tend_trigger(10).unwrap().should_act());
    }

    #[test]
    fn test_tend_delevers_after_debt_shock() {
        let mut pm = manager(10_000);
        pm.invest().unwrap();
        pm.market_mut().shock_borrows(units(1_000));
        assert!(pm.tend_trigger(10).unwrap().should_act());

        let out = pm.tend().unwrap().unwrap();
        assert!(out.moved > U256::ZERO);
        assert!(!pm.tend_trigger(10).unwrap().should_act());
    }

    #[test]
    fn test_tend_after_shutdown_does_not_lever_up() {
        let mut pm = manager(10_000);
        let free = pm.market().free_balance();
        pm.market_mut().deposit(free).unwrap();
        pm.market_mut().borrow(units(1_000)).unwrap();
        pm.shutdown();
        pm.market_mut().clear_journal();

        assert!(pm.tend().unwrap().is_none());
        assert!(pm.market().journal().iter().all(|c| c.op != MarketOp::Borrow));
    }

    #[test]
    fn test_harvest_sells_rewards_and_reports_profit() {
        let mut config = SimulatedMarketConfig::new(protocol());
        config.reward_per_tick = units(1);
        let mut pm = manager_with(config, 10_000);
        pm.invest().unwrap();
        let before = pm.live_position().unwrap().real_supply().unwrap();
        pm.market_mut().advance(50);

        let report = pm.harvest_and_report(before).unwrap();
        assert_eq!(report.rewards_sold, units(50));
        assert!(report.pnl.profit >= units(49));
        assert!(report.pnl.loss.is_zero());
    }

    #[test]
    fn test_harvest_skips_dust_rewards() {
        let mut config = SimulatedMarketConfig::new(protocol());
        config.reward_per_tick = U256::from(10u64);
        let mut pm = manager_with(config, 10_000);
        let mut l = limits();
        l.min_reward_sell = U256::from(1_000u64);
        pm.set_limits(l).unwrap();
        pm.invest().unwrap();
        pm.market_mut().advance(5);

        let report = pm.harvest_and_report(U256::ZERO).unwrap();
        assert!(report.rewards_sold.is_zero());
        assert_eq!(pm.market().pending_reward_value(), U256::from(50u64));
    }

    #[test]
    fn test_estimated_total_assets_haircuts_rewards() {
        let mut config = SimulatedMarketConfig::new(protocol());
        config.reward_per_tick = units(10);
        let mut pm = manager_with(config, 1_000);
        pm.market_mut().advance(10);
        assert_eq!(pm.estimated_total_assets().unwrap(), units(1_090));
    }

    #[test]
    fn test_rejected_params_update_keeps_previous() {
        let mut pm = manager(1_000);
        let before = *pm.params();
        let err = pm
            .set_leverage_params(wad(dec!(0.74)), wad(dec!(0.72)), wad(dec!(0.77)))
            .expect_err("target above max borrow");
        assert!(matches!(err, LeverageError::ParameterOrderingViolation { .. }));
        assert_eq!(*pm.params(), before);

        pm.set_leverage_params(wad(dec!(0.60)), wad(dec!(0.70)), wad(dec!(0.76)))
            .unwrap();
        assert_eq!(pm.params().target_ltv, wad(dec!(0.60)));
    }

    #[test]
    fn test_rejected_limits_update() {
        let mut pm = manager(1_000);
        let bad = OperationalLimits {
            max_iterations: 0,
            ..limits()
        };
        assert!(pm.set_limits(bad).is_err());
        assert_eq!(pm.limits().max_iterations, 12);
    }

    #[test]
    fn test_derived_params_from_market() {
        let market = SimulatedMarket::new(SimulatedMarketConfig::new(protocol()));
        let pm = PositionManager::with_derived_params(
            market,
            &SafetyMargins::default(),
            limits(),
            LeverageMode::Iterative,
        )
        .unwrap();
        assert_eq!(pm.params().max_ltv, wad(dec!(0.795)));
    }
}
