use anyhow::{bail, Result};
use rust_decimal::Decimal;

use crate::constants::MAX_BPS;

use super::types::LevfarmConfig;

/// Largest asset precision whose unit still fits a `Decimal` with room for
/// realistic balances.
const MAX_ASSET_DECIMALS: u8 = 24;

/// Validate invariants across the merged config that serde alone cannot
/// enforce. Every violation is collected before failing. Called
/// automatically by [`super::load_config`].
pub fn validate_config(config: &LevfarmConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_app_config(config, &mut errors);
    validate_market_config(config, &mut errors);
    validate_strategy_config(config, &mut errors);
    validate_keeper_config(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

// ---------------------------------------------------------------------------
// App config
// ---------------------------------------------------------------------------

fn validate_app_config(config: &LevfarmConfig, errors: &mut Vec<String>) {
    if config.app.logging.log_dir.trim().is_empty() {
        errors.push("app.logging: log_dir is empty".into());
    }
}

// ---------------------------------------------------------------------------
// Market config
// ---------------------------------------------------------------------------

fn validate_market_config(config: &LevfarmConfig, errors: &mut Vec<String>) {
    let m = &config.market;

    check_unit_ratio("market.max_borrow_ratio", m.max_borrow_ratio, errors);
    check_unit_ratio("market.liquidation_threshold", m.liquidation_threshold, errors);
    if m.max_borrow_ratio >= m.liquidation_threshold {
        errors.push(format!(
            "market: max_borrow_ratio ({}) must be < liquidation_threshold ({})",
            m.max_borrow_ratio, m.liquidation_threshold
        ));
    }

    for (name, value) in [
        ("supply_rate_per_tick", m.supply_rate_per_tick),
        ("borrow_rate_per_tick", m.borrow_rate_per_tick),
        ("reward_per_tick", m.reward_per_tick),
    ] {
        if value < Decimal::ZERO {
            errors.push(format!("market.{name}: {value} must be >= 0"));
        }
    }
    if let Some(liquidity) = m.liquidity {
        if liquidity < Decimal::ZERO {
            errors.push(format!("market.liquidity: {liquidity} must be >= 0"));
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy config
// ---------------------------------------------------------------------------

fn validate_strategy_config(config: &LevfarmConfig, errors: &mut Vec<String>) {
    let s = &config.strategy;

    if s.asset.symbol.trim().is_empty() {
        errors.push("strategy.asset: symbol is empty".into());
    }
    if s.asset.decimals > MAX_ASSET_DECIMALS {
        errors.push(format!(
            "strategy.asset: decimals ({}) must be <= {MAX_ASSET_DECIMALS}",
            s.asset.decimals
        ));
    }

    let lev = &s.leverage;
    match (lev.target_ltv, lev.max_borrow_ltv, lev.max_ltv) {
        (Some(target), Some(max_borrow), Some(max)) => {
            check_unit_ratio("strategy.leverage.target_ltv", target, errors);
            check_unit_ratio("strategy.leverage.max_borrow_ltv", max_borrow, errors);
            check_unit_ratio("strategy.leverage.max_ltv", max, errors);
            if !(target < max_borrow && max_borrow < max) {
                errors.push(format!(
                    "strategy.leverage: need target_ltv ({target}) < max_borrow_ltv ({max_borrow}) < max_ltv ({max})"
                ));
            }
            if max >= config.market.liquidation_threshold {
                errors.push(format!(
                    "strategy.leverage: max_ltv ({max}) must be < market.liquidation_threshold ({})",
                    config.market.liquidation_threshold
                ));
            }
            if max_borrow > config.market.max_borrow_ratio {
                errors.push(format!(
                    "strategy.leverage: max_borrow_ltv ({max_borrow}) must be <= market.max_borrow_ratio ({})",
                    config.market.max_borrow_ratio
                ));
            }
        }
        (None, None, None) => {
            for (name, value) in [
                ("max_borrow_margin", lev.margins.max_borrow_margin),
                ("target_margin", lev.margins.target_margin),
                ("max_ltv_margin", lev.margins.max_ltv_margin),
            ] {
                if value < Decimal::ZERO || value >= Decimal::ONE {
                    errors.push(format!(
                        "strategy.leverage.margins.{name}: {value} must be in [0, 1)"
                    ));
                }
            }
        }
        _ => errors.push(
            "strategy.leverage: set all of target_ltv, max_borrow_ltv, max_ltv or none of them"
                .into(),
        ),
    }

    let l = &s.limits;
    if l.max_iterations == 0 {
        errors.push("strategy.limits: max_iterations must be >= 1".into());
    }
    if l.reward_haircut_bps > MAX_BPS {
        errors.push(format!(
            "strategy.limits: reward_haircut_bps ({}) must be <= {MAX_BPS}",
            l.reward_haircut_bps
        ));
    }
    if l.min_adjust_ratio < Decimal::ZERO || l.min_adjust_ratio >= Decimal::ONE {
        errors.push(format!(
            "strategy.limits: min_adjust_ratio ({}) must be in [0, 1)",
            l.min_adjust_ratio
        ));
    }
    if l.min_asset < Decimal::ZERO {
        errors.push(format!("strategy.limits: min_asset ({}) must be >= 0", l.min_asset));
    }
    if l.min_reward_sell < Decimal::ZERO {
        errors.push(format!(
            "strategy.limits: min_reward_sell ({}) must be >= 0",
            l.min_reward_sell
        ));
    }
}

// ---------------------------------------------------------------------------
// Keeper config
// ---------------------------------------------------------------------------

fn validate_keeper_config(config: &LevfarmConfig, errors: &mut Vec<String>) {
    let k = &config.keeper;

    if k.poll_interval_seconds == 0 {
        errors.push("keeper: poll_interval_seconds must be > 0".into());
    }
    if k.max_consecutive_failures == 0 {
        errors.push("keeper: max_consecutive_failures must be >= 1".into());
    }
    if k.initial_deposit < Decimal::ZERO {
        errors.push(format!(
            "keeper: initial_deposit ({}) must be >= 0",
            k.initial_deposit
        ));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ratios must lie strictly inside (0, 1).
fn check_unit_ratio(name: &str, value: Decimal, errors: &mut Vec<String>) {
    if value <= Decimal::ZERO || value >= Decimal::ONE {
        errors.push(format!("{name}: {value} must be in (0, 1)"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_check_unit_ratio_bounds() {
        let mut errors = Vec::new();
        check_unit_ratio("a", dec!(0.5), &mut errors);
        assert!(errors.is_empty());

        check_unit_ratio("b", dec!(0), &mut errors);
        check_unit_ratio("c", dec!(1), &mut errors);
        check_unit_ratio("d", dec!(-0.1), &mut errors);
        assert_eq!(errors.len(), 3);
        assert!(errors[1].contains("c: 1 must be in (0, 1)"));
    }
}
