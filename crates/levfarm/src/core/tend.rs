//! Tend decision engine.
//!
//! Pure function of an estimated snapshot, the parameters and the current
//! base fee. Never touches the market, so the keeper can poll it freely.
//!
//! The hysteresis band is exclusive on both edges: with target 0.70 and
//! band 0.005, 0.705 and 0.695 are inside; 0.706 and 0.694 are not.

use crate::types::Wad;

use super::params::{LeverageParams, OperationalLimits};

/// Why the engine decided what it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TendReason {
    NoAssets,
    NoPosition,
    /// At or past `max_ltv` or the liquidation threshold. Ignores gas.
    EmergencyDeleverage,
    BaseFeeTooHigh,
    OverLevered,
    Shutdown,
    UnderLevered,
    WithinBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TendDecision {
    Skip(TendReason),
    Act(TendReason),
}

impl TendDecision {
    pub fn should_act(&self) -> bool {
        matches!(self, Self::Act(_))
    }

    pub fn reason(&self) -> TendReason {
        match self {
            Self::Skip(r) | Self::Act(r) => *r,
        }
    }
}

/// Everything the engine looks at, read without mutating the market.
#[derive(Debug, Clone, Copy)]
pub struct TendInputs {
    /// Idle balance plus collateral.
    pub gross_assets: alloy::primitives::U256,
    pub estimated_ltv: Wad,
    pub liquidation_threshold: Wad,
    pub base_fee_gwei: u64,
    pub is_shutdown: bool,
}

/// `ltv > target + band`.
pub fn is_over_levered(ltv: Wad, params: &LeverageParams, limits: &OperationalLimits) -> bool {
    ltv > params.target_ltv.saturating_add(limits.min_adjust_ratio)
}

/// `ltv < target - band`. A band wider than the target never reports under.
pub fn is_under_levered(ltv: Wad, params: &LeverageParams, limits: &OperationalLimits) -> bool {
    match params.target_ltv.raw().checked_sub(limits.min_adjust_ratio.raw()) {
        Some(floor) => ltv.raw() < floor,
        None => false,
    }
}

pub fn evaluate(inputs: &TendInputs, params: &LeverageParams, limits: &OperationalLimits) -> TendDecision {
    if inputs.gross_assets.is_zero() {
        return TendDecision::Skip(TendReason::NoAssets);
    }
    let ltv = inputs.estimated_ltv;
    if ltv.is_zero() {
        return TendDecision::Skip(TendReason::NoPosition);
    }
    if ltv >= params.max_ltv || ltv >= inputs.liquidation_threshold {
        return TendDecision::Act(TendReason::EmergencyDeleverage);
    }
    if inputs.base_fee_gwei > limits.max_tend_basefee_gwei {
        return TendDecision::Skip(TendReason::BaseFeeTooHigh);
    }
    if is_over_levered(ltv, params, limits) {
        return TendDecision::Act(TendReason::OverLevered);
    }
    if inputs.is_shutdown {
        return TendDecision::Skip(TendReason::Shutdown);
    }
    if is_under_levered(ltv, params, limits) {
        return TendDecision::Act(TendReason::UnderLevered);
    }
    TendDecision::Skip(TendReason::WithinBand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProtocolLimits;
    use alloy::primitives::U256;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn wad(d: rust_decimal::Decimal) -> Wad {
        Wad::from_decimal(d).unwrap()
    }

    fn params() -> LeverageParams {
        LeverageParams::new(
            wad(dec!(0.70)),
            wad(dec!(0.72)),
            wad(dec!(0.80)),
            &ProtocolLimits {
                max_borrow_ratio: wad(dec!(0.75)),
                liquidation_threshold: wad(dec!(0.85)),
            },
        )
        .unwrap()
    }

    fn limits() -> OperationalLimits {
        OperationalLimits {
            min_adjust_ratio: wad(dec!(0.005)),
            max_tend_basefee_gwei: 30,
            ..Default::default()
        }
    }

    fn inputs(ltv: rust_decimal::Decimal) -> TendInputs {
        TendInputs {
            gross_assets: U256::from(1_000_000u64),
            estimated_ltv: wad(ltv),
            liquidation_threshold: wad(dec!(0.85)),
            base_fee_gwei: 10,
            is_shutdown: false,
        }
    }

    #[test]
    fn test_over_band_edge_is_exclusive() {
        let act = evaluate(&inputs(dec!(0.706)), &params(), &limits());
        assert_eq!(act, TendDecision::Act(TendReason::OverLevered));

        let skip = evaluate(&inputs(dec!(0.705)), &params(), &limits());
        assert_eq!(skip, TendDecision::Skip(TendReason::WithinBand));
    }

    #[test]
    fn test_under_band_edge_is_exclusive() {
        let act = evaluate(&inputs(dec!(0.694)), &params(), &limits());
        assert_eq!(act, TendDecision::Act(TendReason::UnderLevered));

        let skip = evaluate(&inputs(dec!(0.695)), &params(), &limits());
        assert_eq!(skip, TendDecision::Skip(TendReason::WithinBand));
    }

    #[test]
    fn test_no_assets_and_no_position() {
        let mut i = inputs(dec!(0.5));
        i.gross_assets = U256::ZERO;
        assert_eq!(evaluate(&i, &params(), &limits()), TendDecision::Skip(TendReason::NoAssets));

        let mut i = inputs(dec!(0));
        i.estimated_ltv = Wad::ZERO;
        assert_eq!(evaluate(&i, &params(), &limits()), TendDecision::Skip(TendReason::NoPosition));
    }

    #[test]
    fn test_emergency_ignores_gas_ceiling() {
        let mut i = inputs(dec!(0.80));
        i.base_fee_gwei = 500;
        assert_eq!(
            evaluate(&i, &params(), &limits()),
            TendDecision::Act(TendReason::EmergencyDeleverage)
        );
    }

    #[test]
    fn test_liquidation_threshold_triggers_emergency() {
        let mut i = inputs(dec!(0.79));
        i.liquidation_threshold = wad(dec!(0.78));
        assert_eq!(
            evaluate(&i, &params(), &limits()),
            TendDecision::Act(TendReason::EmergencyDeleverage)
        );
    }

    #[test]
    fn test_high_base_fee_defers_rebalance() {
        let mut i = inputs(dec!(0.75));
        i.base_fee_gwei = 31;
        assert_eq!(evaluate(&i, &params(), &limits()), TendDecision::Skip(TendReason::BaseFeeTooHigh));

        i.base_fee_gwei = 30;
        assert!(evaluate(&i, &params(), &limits()).should_act());
    }

    #[test]
    fn test_shutdown_blocks_lever_up_not_lever_down() {
        let mut under = inputs(dec!(0.5));
        under.is_shutdown = true;
        assert_eq!(evaluate(&under, &params(), &limits()), TendDecision::Skip(TendReason::Shutdown));

        let mut over = inputs(dec!(0.75));
        over.is_shutdown = true;
        assert_eq!(evaluate(&over, &params(), &limits()), TendDecision::Act(TendReason::OverLevered));
    }

    #[test]
    fn test_band_wider_than_target_never_under() {
        let wide = OperationalLimits {
            min_adjust_ratio: wad(dec!(0.9)),
            ..limits()
        };
        assert!(!is_under_levered(wad(dec!(0.01)), &params(), &wide));
    }

    proptest! {
        #[test]
        fn prop_inside_band_never_acts(offset in 0u64..=5_000_000_000_000_000u64, above in any::<bool>()) {
            let target = wad(dec!(0.70)).raw();
            let ltv = if above { target + U256::from(offset) } else { target - U256::from(offset) };
            let mut i = inputs(dec!(0.70));
            i.estimated_ltv = Wad(ltv);
            prop_assert!(!evaluate(&i, &params(), &limits()).should_act());
        }
    }
}
