//! Lending-market collaborator contract.
//!
//! The leverage controllers only ever talk to a market through this trait.
//! Backends (a plain money market, a flash-loan-capable market, a market
//! that repays debt straight from the collateral receipt token) are chosen
//! at construction time.
//!
//! Every mutating call may change more than it was asked to (interest
//! accrual, rounding), so callers re-read [`LendingMarket::live_position`]
//! rather than trusting their own running totals across iterations.

use alloy::primitives::U256;

use crate::errors::{LeverageError, LeverageResult};
use crate::types::{Position, ProtocolLimits};

/// Optional atomic operations a backend may offer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketCapabilities {
    /// Supports [`LendingMarket::flash_lever`].
    pub flash_loan: bool,
    /// Supports [`LendingMarket::repay_with_collateral`].
    pub repay_with_collateral: bool,
}

pub trait LendingMarket {
    /// Short backend name for log output.
    fn name(&self) -> &str;

    /// Idle asset held next to the position (not deposited).
    fn free_balance(&self) -> U256;

    /// Move `amount` of idle asset into collateral. No-op on zero.
    fn deposit(&mut self, amount: U256) -> LeverageResult<()>;

    /// Remove up to `amount` of collateral; returns what was actually freed.
    /// A short return is a real shortfall (illiquidity), not a retry signal.
    fn withdraw(&mut self, amount: U256) -> LeverageResult<U256>;

    /// Increase debt by `amount`, crediting the idle balance. No-op on zero.
    fn borrow(&mut self, amount: U256) -> LeverageResult<()>;

    /// Repay up to `amount` of debt from the idle balance; returns what was repaid.
    fn repay(&mut self, amount: U256) -> LeverageResult<U256>;

    /// Cheap, read-only, possibly stale position.
    fn estimated_position(&self) -> LeverageResult<Position>;

    /// Authoritative position. May synchronise interest first, so it is
    /// not side-effect free.
    fn live_position(&mut self) -> LeverageResult<Position>;

    /// Market-enforced borrow ceiling and liquidation threshold.
    fn protocol_limits(&self) -> LeverageResult<ProtocolLimits>;

    /// Claim incentive tokens into the position's account.
    fn claim_rewards(&mut self) -> LeverageResult<()>;

    /// Asset value of unclaimed plus claimed-but-unsold rewards.
    fn pending_reward_value(&self) -> U256;

    /// Sell claimed rewards for the asset; returns asset received.
    fn sell_rewards(&mut self) -> LeverageResult<U256>;

    fn capabilities(&self) -> MarketCapabilities {
        MarketCapabilities::default()
    }

    /// Flash-borrow `amount`, deposit it together with the idle balance,
    /// then borrow `amount` against the new collateral to settle the loan.
    fn flash_lever(&mut self, _amount: U256) -> LeverageResult<()> {
        Err(LeverageError::Unsupported {
            operation: "flash_lever",
        })
    }

    /// Repay up to `amount` of debt by burning collateral directly.
    fn repay_with_collateral(&mut self, _amount: U256) -> LeverageResult<U256> {
        Err(LeverageError::Unsupported {
            operation: "repay_with_collateral",
        })
    }
}
