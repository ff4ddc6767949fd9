//! Newtype wrapper for 1e18-scaled ratios.
//!
//! Keeps ratios (LTV, margins, hysteresis band) apart from raw asset amounts
//! at the type level. Both are `U256` underneath.

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use crate::constants::{MAX_BPS, WAD, WAD_DECIMAL};

// ---------------------------------------------------------------------------
// WAD (1e18) loan-to-value ratios
// ---------------------------------------------------------------------------

/// WAD-scaled ratio (18 decimals). `Wad::ONE` is 100%.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wad(pub U256);

impl Wad {
    pub const ONE: Wad = Wad(WAD);
    pub const ZERO: Wad = Wad(U256::ZERO);

    /// Create from a `U256` that is already WAD-scaled.
    pub const fn from_raw(val: U256) -> Self {
        Self(val)
    }

    /// Inner `U256`.
    pub fn raw(self) -> U256 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Ratio from basis points (`9000` → 0.9).
    pub fn from_bps(bps: u32) -> Self {
        Self(WAD * U256::from(bps) / U256::from(MAX_BPS))
    }

    /// Parse a fraction (`0.70`) into a WAD. Negative or oversized values
    /// yield `None`; digits beyond 18 decimals are truncated.
    pub fn from_decimal(val: Decimal) -> Option<Self> {
        if val.is_sign_negative() {
            return None;
        }
        let scaled = val.checked_mul(WAD_DECIMAL)?.trunc();
        scaled.to_u128().map(|raw| Self(U256::from(raw)))
    }

    /// Convert to an off-chain `Decimal` fraction.
    pub fn to_decimal(self) -> Decimal {
        let raw = Decimal::from_str(&self.0.to_string()).unwrap_or_default();
        raw / WAD_DECIMAL
    }

    pub fn saturating_add(self, other: Wad) -> Wad {
        Wad(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Wad) -> Wad {
        Wad(self.0.saturating_sub(other.0))
    }
}

impl fmt::Debug for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wad({})", self.to_decimal())
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// ---------------------------------------------------------------------------
// Free-standing amount helpers
// ---------------------------------------------------------------------------

/// Convert a whole-token `Decimal` (`1500.5`) into base units for an asset
/// with `decimals` decimals. Negative or unrepresentable values yield `None`.
pub fn decimal_to_amount(val: Decimal, decimals: u8) -> Option<U256> {
    if val.is_sign_negative() {
        return None;
    }
    let unit = Decimal::try_from_i128_with_scale(10i128.checked_pow(u32::from(decimals))?, 0).ok()?;
    let scaled = val.checked_mul(unit)?.trunc();
    scaled.to_u128().map(U256::from)
}

/// Convert base units back into whole tokens for log output.
pub fn amount_to_decimal(amount: U256, decimals: u8) -> Decimal {
    let raw = Decimal::from_str(&amount.to_string()).unwrap_or_default();
    let unit = 10i128
        .checked_pow(u32::from(decimals))
        .and_then(|u| Decimal::try_from_i128_with_scale(u, 0).ok())
        .unwrap_or(Decimal::ONE);
    raw / unit
}
