//! Leverage parameters and operational limits.
//!
//! Both records are validated on construction and on every update; a
//! rejected update leaves the previous value untouched.

use alloy::primitives::U256;

use crate::constants::{
    DEFAULT_MAX_BORROW_MARGIN, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_LTV_MARGIN,
    DEFAULT_MAX_TEND_BASEFEE_GWEI, DEFAULT_MIN_ADJUST_RATIO, DEFAULT_REWARD_HAIRCUT_BPS,
    DEFAULT_TARGET_MARGIN, MAX_BPS, WAD,
};
use crate::errors::{LeverageError, LeverageResult};
use crate::types::{ProtocolLimits, Wad};

// ---------------------------------------------------------------------------
// Leverage parameters
// ---------------------------------------------------------------------------

/// Three-tier LTV model: `target < max_borrow < max < liquidation threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeverageParams {
    /// Ratio both controllers steer toward.
    pub target_ltv: Wad,
    /// Ceiling for new borrowing, at or below the market's own.
    pub max_borrow_ltv: Wad,
    /// Risk ceiling; reaching it forces an emergency de-leverage.
    pub max_ltv: Wad,
}

impl LeverageParams {
    pub fn new(
        target_ltv: Wad,
        max_borrow_ltv: Wad,
        max_ltv: Wad,
        limits: &ProtocolLimits,
    ) -> LeverageResult<Self> {
        let params = Self {
            target_ltv,
            max_borrow_ltv,
            max_ltv,
        };
        params.validate(limits)?;
        Ok(params)
    }

    /// Derive from the market's published limits minus safety margins.
    pub fn derive(limits: &ProtocolLimits, margins: &SafetyMargins) -> LeverageResult<Self> {
        let max_borrow_ltv = limits.max_borrow_ratio.saturating_sub(margins.max_borrow);
        let target_ltv = max_borrow_ltv.saturating_sub(margins.target);
        let max_ltv = limits.liquidation_threshold.saturating_sub(margins.max_ltv);
        Self::new(target_ltv, max_borrow_ltv, max_ltv, limits)
    }

    pub fn validate(&self, limits: &ProtocolLimits) -> LeverageResult<()> {
        for ratio in [
            self.target_ltv,
            self.max_borrow_ltv,
            self.max_ltv,
            limits.liquidation_threshold,
        ] {
            if ratio.raw() >= WAD {
                return Err(LeverageError::InvalidRatio { ratio });
            }
        }

        let ordered = self.target_ltv < self.max_borrow_ltv
            && self.max_borrow_ltv < self.max_ltv
            && self.max_ltv < limits.liquidation_threshold
            && self.max_borrow_ltv <= limits.max_borrow_ratio;
        if !ordered {
            return Err(LeverageError::ParameterOrderingViolation {
                target: self.target_ltv,
                max_borrow: self.max_borrow_ltv,
                max: self.max_ltv,
                liquidation_threshold: limits.liquidation_threshold,
            });
        }
        Ok(())
    }
}

/// Distances kept below the market's published limits when deriving
/// [`LeverageParams`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyMargins {
    pub max_borrow: Wad,
    pub target: Wad,
    pub max_ltv: Wad,
}

impl Default for SafetyMargins {
    fn default() -> Self {
        Self {
            max_borrow: Wad::from_decimal(DEFAULT_MAX_BORROW_MARGIN).unwrap_or_default(),
            target: Wad::from_decimal(DEFAULT_TARGET_MARGIN).unwrap_or_default(),
            max_ltv: Wad::from_decimal(DEFAULT_MAX_LTV_MARGIN).unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Operational limits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationalLimits {
    pub max_iterations: u8,
    /// Dust floor for deposit/borrow/repay steps.
    pub min_asset: U256,
    /// Hysteresis half-width around the target LTV.
    pub min_adjust_ratio: Wad,
    /// Rewards worth less than this are left unsold.
    pub min_reward_sell: U256,
    pub max_tend_basefee_gwei: u64,
    /// Share of unrealized reward value counted as assets, in bps.
    pub reward_haircut_bps: u32,
}

impl Default for OperationalLimits {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            min_asset: U256::ZERO,
            min_adjust_ratio: Wad::from_decimal(DEFAULT_MIN_ADJUST_RATIO).unwrap_or_default(),
            min_reward_sell: U256::ZERO,
            max_tend_basefee_gwei: DEFAULT_MAX_TEND_BASEFEE_GWEI,
            reward_haircut_bps: DEFAULT_REWARD_HAIRCUT_BPS,
        }
    }
}

impl OperationalLimits {
    pub fn validate(&self) -> LeverageResult<()> {
        if self.max_iterations == 0 {
            return Err(LeverageError::InvalidLimits {
                reason: "max_iterations must be at least 1".into(),
            });
        }
        if self.reward_haircut_bps > MAX_BPS {
            return Err(LeverageError::InvalidLimits {
                reason: format!(
                    "reward_haircut_bps {} exceeds {MAX_BPS}",
                    self.reward_haircut_bps
                ),
            });
        }
        if self.min_adjust_ratio.raw() >= WAD {
            return Err(LeverageError::InvalidLimits {
                reason: format!("min_adjust_ratio {} must be below 1.0", self.min_adjust_ratio),
            });
        }
        Ok(())
    }

    /// Reward value after the haircut.
    pub fn haircut(&self, value: U256) -> U256 {
        value.saturating_mul(U256::from(self.reward_haircut_bps)) / U256::from(MAX_BPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wad(d: rust_decimal::Decimal) -> Wad {
        Wad::from_decimal(d).unwrap()
    }

    fn limits() -> ProtocolLimits {
        ProtocolLimits {
            max_borrow_ratio: wad(dec!(0.75)),
            liquidation_threshold: wad(dec!(0.80)),
        }
    }

    #[test]
    fn test_ordered_params_accepted() {
        let p = LeverageParams::new(wad(dec!(0.70)), wad(dec!(0.72)), wad(dec!(0.77)), &limits());
        assert!(p.is_ok());
    }

    #[test]
    fn test_target_above_max_borrow_rejected() {
        let err = LeverageParams::new(wad(dec!(0.73)), wad(dec!(0.72)), wad(dec!(0.77)), &limits())
            .expect_err("target above max borrow");
        assert!(matches!(err, LeverageError::ParameterOrderingViolation { .. }));
    }

    #[test]
    fn test_max_at_liquidation_threshold_rejected() {
        let err = LeverageParams::new(wad(dec!(0.70)), wad(dec!(0.72)), wad(dec!(0.80)), &limits())
            .expect_err("max equal to threshold");
        assert!(err.to_string().contains("parameter ordering violated"));
    }

    #[test]
    fn test_max_borrow_above_market_ceiling_rejected() {
        let err = LeverageParams::new(wad(dec!(0.70)), wad(dec!(0.76)), wad(dec!(0.78)), &limits())
            .expect_err("max borrow above market");
        assert!(matches!(err, LeverageError::ParameterOrderingViolation { .. }));
    }

    #[test]
    fn test_ratio_of_one_is_invalid_not_misordered() {
        let err = LeverageParams::new(Wad::ONE, wad(dec!(0.72)), wad(dec!(0.77)), &limits())
            .expect_err("ratio of one");
        assert_eq!(err, LeverageError::InvalidRatio { ratio: Wad::ONE });
    }

    #[test]
    fn test_derive_from_protocol_limits() {
        let p = LeverageParams::derive(&limits(), &SafetyMargins::default()).unwrap();
        assert_eq!(p.max_borrow_ltv, wad(dec!(0.745)));
        assert_eq!(p.target_ltv, wad(dec!(0.725)));
        assert_eq!(p.max_ltv, wad(dec!(0.795)));
    }

    #[test]
    fn test_derive_with_oversized_margins_fails() {
        let margins = SafetyMargins {
            max_borrow: wad(dec!(0.05)),
            target: wad(dec!(0.01)),
            max_ltv: wad(dec!(0.10)),
        };
        // max borrow 0.70 vs max 0.70: not strictly ordered.
        let err = LeverageParams::derive(&limits(), &margins).expect_err("collapsed tiers");
        assert!(matches!(err, LeverageError::ParameterOrderingViolation { .. }));
    }

    #[test]
    fn test_limits_validate() {
        assert!(OperationalLimits::default().validate().is_ok());

        let zero_iter = OperationalLimits {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(zero_iter.validate().is_err());

        let big_haircut = OperationalLimits {
            reward_haircut_bps: 10_001,
            ..Default::default()
        };
        let err = big_haircut.validate().expect_err("haircut over 100%");
        assert!(err.to_string().contains("reward_haircut_bps"));
    }

    #[test]
    fn test_haircut_90_percent() {
        let limits = OperationalLimits::default();
        assert_eq!(limits.haircut(U256::from(1_000u64)), U256::from(900u64));
    }
}
