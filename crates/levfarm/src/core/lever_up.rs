//! Lever-up controller.
//!
//! Grows debt toward `borrow_from_supply(real_supply, target_ltv)`. Each
//! iteration deposits the idle balance, borrows as much of the remainder as
//! `max_borrow_ltv` allows against the new collateral, then re-reads the live
//! position. Local totals are only trusted between those two calls.

use alloy::primitives::U256;
use tracing::{debug, info, warn};

use crate::errors::LeverageResult;
use crate::execution::LendingMarket;
use crate::types::{LeverageMode, LoopExit, LoopOutcome};

use super::ltv_math;
use super::oracle;
use super::params::{LeverageParams, OperationalLimits};
use super::tend::is_under_levered;

pub fn lever_up<M: LendingMarket + ?Sized>(
    market: &mut M,
    params: &LeverageParams,
    limits: &OperationalLimits,
    mode: LeverageMode,
) -> LeverageResult<LoopOutcome> {
    // Band check on the cheap read: inside the band means zero market calls.
    let estimate = oracle::estimated(market)?;
    if !is_under_levered(estimate.ltv()?, params, limits) {
        return Ok(LoopOutcome::no_action(estimate));
    }

    let mut snap = oracle::live(market)?;
    let target_borrow = ltv_math::borrow_from_supply(snap.real_supply()?, params.target_ltv)?;
    let total = target_borrow.saturating_sub(snap.borrows);
    if total.is_zero() {
        return Ok(LoopOutcome::no_action(snap));
    }

    if mode == LeverageMode::Atomic {
        if market.capabilities().flash_loan {
            market.flash_lever(total)?;
            let snap = oracle::live(market)?;
            info!(
                market = market.name(),
                borrowed = %total,
                ltv = %snap.ltv()?,
                "atomic lever-up complete"
            );
            return Ok(LoopOutcome {
                exit: LoopExit::Atomic,
                iterations: 1,
                moved: total,
                remaining: U256::ZERO,
                position: snap,
            });
        }
        warn!(
            market = market.name(),
            "market has no flash loan support, falling back to iterative lever-up"
        );
    }

    let mut remaining = total;
    let mut moved = U256::ZERO;
    let mut iterations: u8 = 0;

    let exit = loop {
        if remaining <= limits.min_asset {
            break LoopExit::Converged;
        }
        if iterations >= limits.max_iterations {
            break LoopExit::BudgetExhausted;
        }

        let collateral = snap.deposits.saturating_add(snap.free_balance);
        let ceiling = ltv_math::borrow_from_deposit(collateral, params.max_borrow_ltv)?;
        let capacity = ceiling.saturating_sub(snap.borrows);
        if capacity.is_zero() {
            break LoopExit::Stalled;
        }
        let step = remaining.min(capacity);

        market.deposit(snap.free_balance)?;
        market.borrow(step)?;
        iterations += 1;
        moved = moved.saturating_add(step);
        remaining = remaining.saturating_sub(step);

        snap = oracle::live(market)?;
        debug!(
            iteration = iterations,
            step = %step,
            remaining = %remaining,
            deposits = %snap.deposits,
            borrows = %snap.borrows,
            "lever-up step"
        );
    };

    // Mop-up: the last borrow lands in the idle balance.
    if snap.free_balance > limits.min_asset {
        market.deposit(snap.free_balance)?;
        snap = oracle::live(market)?;
    }

    match exit {
        LoopExit::BudgetExhausted => warn!(
            iterations,
            remaining = %remaining,
            ltv = %snap.ltv()?,
            "lever-up iteration budget exhausted"
        ),
        LoopExit::Stalled => warn!(
            iterations,
            remaining = %remaining,
            "lever-up stalled at borrow ceiling"
        ),
        _ => info!(
            iterations,
            borrowed = %moved,
            ltv = %snap.ltv()?,
            "lever-up converged"
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
