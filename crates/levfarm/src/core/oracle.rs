//! Position oracle.
//!
//! Two read paths over a [`LendingMarket`]:
//! - [`estimated`]: view-only, possibly stale. Safe for decision code.
//! - [`live`]: authoritative, may synchronise interest at the market.
//!
//! Both reject `borrows > deposits` with `PositionInconsistency` instead of
//! letting downstream arithmetic saturate it away.

use alloy::primitives::U256;
use tracing::error;

use crate::errors::{LeverageError, LeverageResult};
use crate::execution::LendingMarket;
use crate::types::{Position, PositionSnapshot};

fn checked(
    market_name: &str,
    position: Position,
    free: U256,
) -> LeverageResult<PositionSnapshot> {
    if position.borrows > position.deposits {
        error!(
            market = market_name,
            deposits = %position.deposits,
            borrows = %position.borrows,
            "market reports borrows above deposits"
        );
        return Err(LeverageError::PositionInconsistency {
            deposits: position.deposits,
            borrows: position.borrows,
        });
    }
    Ok(PositionSnapshot::new(position, free))
}

/// Cheap snapshot from the market's last known state.
pub fn estimated<M: LendingMarket + ?Sized>(market: &M) -> LeverageResult<PositionSnapshot> {
    let position = market.estimated_position()?;
    checked(market.name(), position, market.free_balance())
}

/// Authoritative snapshot. Not side-effect free.
pub fn live<M: LendingMarket + ?Sized>(market: &mut M) -> LeverageResult<PositionSnapshot> {
    let position = market.live_position()?;
    checked(market.name(), position, market.free_balance())
}
