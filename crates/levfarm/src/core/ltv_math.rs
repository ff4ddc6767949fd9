//! Loan-to-value arithmetic at WAD precision.
//!
//! Pure conversions between deposit amount, borrow amount and ratio. Every
//! division truncates toward zero, which biases the controllers toward
//! under-leveraging: a computed borrow is never larger than the exact value,
//! and a computed ratio never exceeds the exact ratio.
//!
//! Ratio inputs must be strictly below `Wad::ONE`; anything else is a
//! misconfiguration and aborts with [`LeverageError::InvalidRatio`].

use alloy::primitives::U256;

use crate::constants::WAD;
use crate::errors::{LeverageError, LeverageResult};
use crate::types::Wad;

fn check_ratio(ratio: Wad) -> LeverageResult<()> {
    if ratio.raw() >= WAD {
        return Err(LeverageError::InvalidRatio { ratio });
    }
    Ok(())
}

fn mul(a: U256, b: U256, context: &'static str) -> LeverageResult<U256> {
    a.checked_mul(b)
        .ok_or(LeverageError::ArithmeticOverflow { context })
}

/// `borrows / deposits`. Exactly zero when either side is zero.
pub fn ltv(deposits: U256, borrows: U256) -> LeverageResult<Wad> {
    if deposits.is_zero() || borrows.is_zero() {
        return Ok(Wad::ZERO);
    }
    Ok(Wad(mul(borrows, WAD, "ltv")? / deposits))
}

/// Largest borrow a `deposit` supports at `ratio`.
pub fn borrow_from_deposit(deposit: U256, ratio: Wad) -> LeverageResult<U256> {
    check_ratio(ratio)?;
    if ratio.is_zero() {
        return Ok(U256::ZERO);
    }
    Ok(mul(deposit, ratio.raw(), "borrow_from_deposit")? / WAD)
}

/// Deposit needed to carry `borrow` at `ratio`.
///
/// A zero ratio means no finite deposit satisfies it; returns `U256::MAX`.
pub fn deposit_from_borrow(borrow: U256, ratio: Wad) -> LeverageResult<U256> {
    check_ratio(ratio)?;
    if ratio.is_zero() {
        return Ok(U256::MAX);
    }
    Ok(mul(borrow, WAD, "deposit_from_borrow")? / ratio.raw())
}

/// Borrow that, added to `supply` and re-deposited, lands exactly on `ratio`.
///
/// Solves `b = (supply + b) * ratio / 1e18`, i.e. `b = supply * r / (1e18 - r)`.
pub fn borrow_from_supply(supply: U256, ratio: Wad) -> LeverageResult<U256> {
    check_ratio(ratio)?;
    if ratio.is_zero() {
        return Ok(U256::ZERO);
    }
    Ok(mul(supply, ratio.raw(), "borrow_from_supply")? / (WAD - ratio.raw()))
}

/// Collateral that can leave the position while keeping `borrows / deposits`
/// at or below `ceiling`.
///
/// Keeps one base unit above the truncated requirement so the post-withdraw
/// ratio never rounds above the ceiling.
pub fn excess_collateral(deposits: U256, borrows: U256, ceiling: Wad) -> LeverageResult<U256> {
    if borrows.is_zero() {
        return Ok(deposits);
    }
    let required = deposit_from_borrow(borrows, ceiling)?.saturating_add(U256::from(1));
    Ok(deposits.saturating_sub(required))
}
