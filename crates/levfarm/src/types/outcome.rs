use alloy::primitives::U256;

use super::position::PositionSnapshot;

/// Why a lever-up or lever-down call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Nothing to do on entry.
    NoAction,
    /// Remaining amount fell to or below the dust floor.
    Converged,
    /// Ran `max_iterations` with work left.
    BudgetExhausted,
    /// A step could make no progress (market ceiling, no free balance).
    Stalled,
    /// Completed in one atomic market call.
    Atomic,
}

/// Result of one lever-up or lever-down invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    pub exit: LoopExit,
    pub iterations: u8,
    /// Amount borrowed (lever-up) or repaid (lever-down).
    pub moved: U256,
    /// Amount still short of the target when the loop stopped.
    pub remaining: U256,
    /// Authoritative position after the call.
    pub position: PositionSnapshot,
}

impl LoopOutcome {
    pub fn no_action(position: PositionSnapshot) -> Self {
        Self {
            exit: LoopExit::NoAction,
            iterations: 0,
            moved: U256::ZERO,
            remaining: U256::ZERO,
            position,
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.exit == LoopExit::BudgetExhausted
    }

    /// True when the target was reached (or nothing needed doing).
    pub fn reached_target(&self) -> bool {
        matches!(
            self.exit,
            LoopExit::NoAction | LoopExit::Converged | LoopExit::Atomic
        )
    }
}

/// Result of a free-funds or emergency-withdraw request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeOutcome {
    pub requested: U256,
    /// Asset now sitting in the free balance for the vault layer to collect.
    pub freed: U256,
    /// Unavoidable shortfall (`requested - freed`), to be booked as loss.
    pub loss: U256,
}

impl FreeOutcome {
    pub fn new(requested: U256, freed: U256) -> Self {
        Self {
            requested,
            freed,
            loss: requested.saturating_sub(freed),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.loss.is_zero()
    }
}

/// Profit or loss between two total-asset readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfitAndLoss {
    pub profit: U256,
    pub loss: U256,
}

impl ProfitAndLoss {
    pub fn between(previous: U256, current: U256) -> Self {
        Self {
            profit: current.saturating_sub(previous),
            loss: previous.saturating_sub(current),
        }
    }
}

/// Result of the harvest/report verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestReport {
    /// `free balance + deposits - borrows`, read live after the tend step.
    pub total_assets: U256,
    /// Asset received from selling claimed rewards.
    pub rewards_sold: U256,
    pub pnl: ProfitAndLoss,
}
