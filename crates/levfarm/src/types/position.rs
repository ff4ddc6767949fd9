use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::ltv_math;
use crate::errors::{LeverageError, LeverageResult};

use super::wad::Wad;

/// Collateral and debt held at the lending market, both in asset base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub deposits: U256,
    pub borrows: U256,
}

impl Position {
    pub fn new(deposits: U256, borrows: U256) -> Self {
        Self { deposits, borrows }
    }
}

/// Market-enforced ceilings, sourced from the market adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolLimits {
    /// Highest LTV at which the market still allows new borrowing.
    pub max_borrow_ratio: Wad,
    /// LTV at which the position becomes liquidatable.
    pub liquidation_threshold: Wad,
}

/// How the controllers move between leverage levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeverageMode {
    /// Bounded deposit/borrow and withdraw/repay loops.
    #[default]
    Iterative,
    /// Single flash-loan jump up; single repay-with-collateral down.
    Atomic,
}

impl LeverageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iterative => "iterative",
            Self::Atomic => "atomic",
        }
    }
}

impl fmt::Display for LeverageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeverageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "iterative" => Ok(Self::Iterative),
            "atomic" => Ok(Self::Atomic),
            other => Err(format!("unknown leverage mode: {other}")),
        }
    }
}

/// Position plus the idle asset balance next to it.
///
/// Produced by the position oracle; see [`crate::core::oracle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub deposits: U256,
    pub borrows: U256,
    pub free_balance: U256,
}

impl PositionSnapshot {
    pub fn new(position: Position, free_balance: U256) -> Self {
        Self {
            deposits: position.deposits,
            borrows: position.borrows,
            free_balance,
        }
    }

    pub fn ltv(&self) -> LeverageResult<Wad> {
        ltv_math::ltv(self.deposits, self.borrows)
    }

    /// `deposits - borrows`. Borrows above deposits are surfaced, never clamped.
    pub fn net_position(&self) -> LeverageResult<U256> {
        self.deposits
            .checked_sub(self.borrows)
            .ok_or(LeverageError::PositionInconsistency {
                deposits: self.deposits,
                borrows: self.borrows,
            })
    }

    /// Equity available to lever: net position plus idle balance.
    pub fn real_supply(&self) -> LeverageResult<U256> {
        Ok(self.net_position()?.saturating_add(self.free_balance))
    }

    /// Gross managed assets (idle + collateral), before netting debt.
    pub fn gross_assets(&self) -> U256 {
        self.free_balance.saturating_add(self.deposits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(d: u64, b: u64, f: u64) -> PositionSnapshot {
        PositionSnapshot {
            deposits: U256::from(d),
            borrows: U256::from(b),
            free_balance: U256::from(f),
        }
    }

    #[test]
    fn test_real_supply() {
        assert_eq!(snap(1000, 400, 50).real_supply().unwrap(), U256::from(650u64));
    }

    #[test]
    fn test_net_position_inconsistent() {
        let err = snap(100, 150, 0).net_position().unwrap_err();
        assert_eq!(
            err,
            LeverageError::PositionInconsistency {
                deposits: U256::from(100u64),
                borrows: U256::from(150u64),
            }
        );
    }

    #[test]
    fn test_gross_assets_ignores_debt() {
        assert_eq!(snap(100, 150, 5).gross_assets(), U256::from(105u64));
    }

    #[test]
    fn test_leverage_mode_parse() {
        assert_eq!("Atomic".parse::<LeverageMode>().unwrap(), LeverageMode::Atomic);
        assert_eq!(" iterative ".parse::<LeverageMode>().unwrap(), LeverageMode::Iterative);
        assert!("flash".parse::<LeverageMode>().is_err());
    }

    #[test]
    fn test_leverage_mode_serde() {
        let m: LeverageMode = serde_json::from_str("\"atomic\"").unwrap();
        assert_eq!(m, LeverageMode::Atomic);
    }
}
