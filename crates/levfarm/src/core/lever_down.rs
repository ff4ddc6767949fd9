//! Lever-down controller.
//!
//! Shrinks debt to a target borrow amount. Each iteration withdraws the
//! collateral that is surplus at `max_ltv`, repays what the idle balance now
//! covers and re-reads the live position. The remaining repayment is always
//! recomputed from that read, never carried forward from local arithmetic.
//!
//! A partial unwind finishes by depositing back enough idle asset to sit at
//! the target ratio. A full unwind (emergency) skips that step and runs the
//! loop down to zero debt with no dust floor.

use alloy::primitives::U256;
use tracing::{debug, info, warn};

use crate::errors::LeverageResult;
use crate::execution::LendingMarket;
use crate::types::{LeverageMode, LoopExit, LoopOutcome, PositionSnapshot, Wad};

use super::ltv_math;
use super::oracle;
use super::params::{LeverageParams, OperationalLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unwind {
    /// Stop within `min_asset` of the target, then restore the target ratio.
    Partial,
    /// Repay to exactly the target (normally zero); no ratio restoration.
    Full,
}

/// Withdrawal ceiling for one iteration.
///
/// Normally `max_ltv`. A position already past it has no surplus at that
/// ceiling, so the step withdraws against the midpoint between its own LTV
/// and the liquidation threshold instead.
fn step_ceiling(
    snap: &PositionSnapshot,
    params: &LeverageParams,
    liquidation_threshold: Wad,
) -> LeverageResult<Wad> {
    let ltv = snap.ltv()?;
    if ltv < params.max_ltv || ltv >= liquidation_threshold {
        return Ok(params.max_ltv);
    }
    let gap = liquidation_threshold.raw() - ltv.raw();
    Ok(Wad(ltv.raw() + gap / U256::from(2u8)))
}

pub fn lever_down<M: LendingMarket + ?Sized>(
    market: &mut M,
    params: &LeverageParams,
    limits: &OperationalLimits,
    mode: LeverageMode,
    target_borrow: U256,
    unwind: Unwind,
) -> LeverageResult<LoopOutcome> {
    let floor = match unwind {
        Unwind::Partial => limits.min_asset,
        Unwind::Full => U256::ZERO,
    };

    let mut snap = oracle::live(market)?;
    if snap.borrows <= target_borrow {
        if unwind == Unwind::Partial {
            snap = restore_target_ratio(market, params, snap)?;
        }
        return Ok(LoopOutcome::no_action(snap));
    }

    if mode == LeverageMode::Atomic {
        if market.capabilities().repay_with_collateral {
            let requested = snap.borrows - target_borrow;
            let repaid = market.repay_with_collateral(requested)?;
            snap = oracle::live(market)?;
            if unwind == Unwind::Partial {
                snap = restore_target_ratio(market, params, snap)?;
            }
            info!(
                market = market.name(),
                repaid = %repaid,
                ltv = %snap.ltv()?,
                "atomic lever-down complete"
            );
            return Ok(LoopOutcome {
                exit: LoopExit::Atomic,
                iterations: 1,
                moved: repaid,
                remaining: snap.borrows.saturating_sub(target_borrow),
                position: snap,
            });
        }
        warn!(
            market = market.name(),
            "market cannot repay with collateral, falling back to iterative lever-down"
        );
    }

    let liquidation_threshold = market.protocol_limits()?.liquidation_threshold;
    let mut moved = U256::ZERO;
    let mut iterations: u8 = 0;

    let exit = loop {
        let remaining = snap.borrows.saturating_sub(target_borrow);
        if remaining <= floor {
            break LoopExit::Converged;
        }
        if iterations >= limits.max_iterations {
            break LoopExit::BudgetExhausted;
        }

        let ceiling = step_ceiling(&snap, params, liquidation_threshold)?;
        let excess = ltv_math::excess_collateral(snap.deposits, snap.borrows, ceiling)?;
        let withdrawn = if excess.is_zero() {
            U256::ZERO
        } else {
            market.withdraw(excess)?
        };

        let available = snap.free_balance.saturating_add(withdrawn);
        let to_repay = remaining.min(available);
        if to_repay.is_zero() {
            break LoopExit::Stalled;
        }
        let repaid = market.repay(to_repay)?;
        iterations += 1;
        moved = moved.saturating_add(repaid);

        snap = oracle::live(market)?;
        debug!(
            iteration = iterations,
            withdrawn = %withdrawn,
            repaid = %repaid,
            deposits = %snap.deposits,
            borrows = %snap.borrows,
            "lever-down step"
        );
        if repaid.is_zero() {
            break LoopExit::Stalled;
        }
    };

    if unwind == Unwind::Partial {
        snap = restore_target_ratio(market, params, snap)?;
    }

    let remaining = snap.borrows.saturating_sub(target_borrow);
    match exit {
        LoopExit::BudgetExhausted => warn!(
            iterations,
            remaining = %remaining,
            ltv = %snap.ltv()?,
            "lever-down iteration budget exhausted"
        ),
        LoopExit::Stalled => warn!(
            iterations,
            remaining = %remaining,
            "lever-down stalled, no asset available to repay"
        ),
        _ => info!(
            iterations,
            repaid = %moved,
            ltv = %snap.ltv()?,
            "lever-down converged"
        ),
    }

    Ok(LoopOutcome {
        exit,
        iterations,
        moved,
        remaining,
        position: snap,
    })
}

/// Deposit idle asset until collateral covers the debt at `target_ltv`.
fn restore_target_ratio<M: LendingMarket + ?Sized>(
    market: &mut M,
    params: &LeverageParams,
    snap: PositionSnapshot,
) -> LeverageResult<PositionSnapshot> {
    if snap.borrows.is_zero() {
        return Ok(snap);
    }
    let target_deposit = ltv_math::deposit_from_borrow(snap.borrows, params.target_ltv)?;
    if target_deposit <= snap.deposits {
        return Ok(snap);
    }
    let top_up = (target_deposit - snap.deposits).min(snap.free_balance);
    if top_up.is_zero() {
        return Ok(snap);
    }
    market.deposit(top_up)?;
    debug!(deposited = %top_up, "restored target ratio");
    oracle::live(market)
}

/// Withdraw collateral above what `ceiling` requires, at most `cap`.
/// Returns what the market actually released.
pub fn withdraw_excess<M: LendingMarket + ?Sized>(
    market: &mut M,
    ceiling: Wad,
    cap: U256,
) -> LeverageResult<U256> {
    let snap = oracle::live(market)?;
    let excess = ltv_math::excess_collateral(snap.deposits, snap.borrows, ceiling)?.min(cap);
    if excess.is_zero() {
        return Ok(U256::ZERO);
    }
    market.withdraw(excess)
}
