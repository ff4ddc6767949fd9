use alloy::primitives::U256;
use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_MAX_BORROW_MARGIN, DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_MAX_ITERATIONS,
    DEFAULT_MAX_LTV_MARGIN, DEFAULT_MAX_TEND_BASEFEE_GWEI, DEFAULT_MIN_ADJUST_RATIO,
    DEFAULT_POLL_INTERVAL_SECONDS, DEFAULT_REWARD_HAIRCUT_BPS, DEFAULT_TARGET_MARGIN,
};
use crate::core::{OperationalLimits, SafetyMargins};
use crate::execution::SimulatedMarketConfig;
use crate::types::{decimal_to_amount, LeverageMode, ProtocolLimits, Wad};

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LevfarmConfig {
    pub app: AppConfig,
    pub strategy: StrategyConfig,
    pub market: MarketConfig,
    pub keeper: KeeperConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
}

// ---------------------------------------------------------------------------
// strategy.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub asset: AssetConfig,
    pub leverage: LeverageConfig,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub mode: LeverageMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub decimals: u8,
}

/// Either all three explicit ratios, or none (derive from margins).
#[derive(Debug, Clone, Deserialize)]
pub struct LeverageConfig {
    pub target_ltv: Option<Decimal>,
    pub max_borrow_ltv: Option<Decimal>,
    pub max_ltv: Option<Decimal>,
    #[serde(default)]
    pub margins: MarginsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarginsConfig {
    pub max_borrow_margin: Decimal,
    pub target_margin: Decimal,
    pub max_ltv_margin: Decimal,
}

impl Default for MarginsConfig {
    fn default() -> Self {
        Self {
            max_borrow_margin: DEFAULT_MAX_BORROW_MARGIN,
            target_margin: DEFAULT_TARGET_MARGIN,
            max_ltv_margin: DEFAULT_MAX_LTV_MARGIN,
        }
    }
}

/// Amounts are whole tokens; converted with `asset.decimals`.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u8,
    pub min_asset: Decimal,
    #[serde(default = "default_min_adjust_ratio")]
    pub min_adjust_ratio: Decimal,
    pub min_reward_sell: Decimal,
    #[serde(default = "default_max_tend_basefee_gwei")]
    pub max_tend_basefee_gwei: u64,
    #[serde(default = "default_reward_haircut_bps")]
    pub reward_haircut_bps: u32,
}

fn default_max_iterations() -> u8 {
    DEFAULT_MAX_ITERATIONS
}

fn default_min_adjust_ratio() -> Decimal {
    DEFAULT_MIN_ADJUST_RATIO
}

fn default_max_tend_basefee_gwei() -> u64 {
    DEFAULT_MAX_TEND_BASEFEE_GWEI
}

fn default_reward_haircut_bps() -> u32 {
    DEFAULT_REWARD_HAIRCUT_BPS
}

// ---------------------------------------------------------------------------
// market.json
// ---------------------------------------------------------------------------

/// Simulated market backend.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub max_borrow_ratio: Decimal,
    pub liquidation_threshold: Decimal,
    /// Pool cash in whole tokens; absent means unlimited.
    pub liquidity: Option<Decimal>,
    #[serde(default)]
    pub supply_rate_per_tick: Decimal,
    #[serde(default)]
    pub borrow_rate_per_tick: Decimal,
    /// Whole tokens of reward value per tick.
    #[serde(default)]
    pub reward_per_tick: Decimal,
    #[serde(default)]
    pub flash_loan: bool,
    #[serde(default)]
    pub repay_with_collateral: bool,
}

// ---------------------------------------------------------------------------
// keeper.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct KeeperConfig {
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Whole tokens credited to the simulated vault at startup.
    pub initial_deposit: Decimal,
    pub base_fee_gwei: u64,
    /// Simulated market ticks advanced per poll.
    #[serde(default)]
    pub ticks_per_poll: u64,
}

fn default_poll_interval_seconds() -> u64 {
    DEFAULT_POLL_INTERVAL_SECONDS
}

fn default_max_consecutive_failures() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_FAILURES
}

// ---------------------------------------------------------------------------
// Conversions into engine types
// ---------------------------------------------------------------------------

fn ratio(name: &str, value: Decimal) -> Result<Wad> {
    Wad::from_decimal(value).ok_or_else(|| anyhow!("{name}: {value} is not a valid ratio"))
}

fn amount(name: &str, value: Decimal, decimals: u8) -> Result<U256> {
    decimal_to_amount(value, decimals)
        .ok_or_else(|| anyhow!("{name}: {value} is not representable with {decimals} decimals"))
}

impl StrategyConfig {
    /// Explicit `(target, max_borrow, max)` if all three are configured.
    pub fn explicit_ratios(&self) -> Result<Option<(Wad, Wad, Wad)>> {
        let lev = &self.leverage;
        match (lev.target_ltv, lev.max_borrow_ltv, lev.max_ltv) {
            (Some(t), Some(b), Some(m)) => Ok(Some((
                ratio("target_ltv", t)?,
                ratio("max_borrow_ltv", b)?,
                ratio("max_ltv", m)?,
            ))),
            _ => Ok(None),
        }
    }

    pub fn safety_margins(&self) -> Result<SafetyMargins> {
        let m = &self.leverage.margins;
        Ok(SafetyMargins {
            max_borrow: ratio("max_borrow_margin", m.max_borrow_margin)?,
            target: ratio("target_margin", m.target_margin)?,
            max_ltv: ratio("max_ltv_margin", m.max_ltv_margin)?,
        })
    }

    pub fn operational_limits(&self) -> Result<OperationalLimits> {
        let l = &self.limits;
        let decimals = self.asset.decimals;
        Ok(OperationalLimits {
            max_iterations: l.max_iterations,
            min_asset: amount("min_asset", l.min_asset, decimals)?,
            min_adjust_ratio: ratio("min_adjust_ratio", l.min_adjust_ratio)?,
            min_reward_sell: amount("min_reward_sell", l.min_reward_sell, decimals)?,
            max_tend_basefee_gwei: l.max_tend_basefee_gwei,
            reward_haircut_bps: l.reward_haircut_bps,
        })
    }
}

impl MarketConfig {
    pub fn protocol_limits(&self) -> Result<ProtocolLimits> {
        Ok(ProtocolLimits {
            max_borrow_ratio: ratio("max_borrow_ratio", self.max_borrow_ratio)?,
            liquidation_threshold: ratio("liquidation_threshold", self.liquidation_threshold)?,
        })
    }

    pub fn simulated(&self, decimals: u8) -> Result<SimulatedMarketConfig> {
        let mut config = SimulatedMarketConfig::new(self.protocol_limits()?);
        if let Some(liquidity) = self.liquidity {
            config.liquidity = amount("liquidity", liquidity, decimals)?;
        }
        config.supply_rate_per_tick = ratio("supply_rate_per_tick", self.supply_rate_per_tick)?;
        config.borrow_rate_per_tick = ratio("borrow_rate_per_tick", self.borrow_rate_per_tick)?;
        config.reward_per_tick = amount("reward_per_tick", self.reward_per_tick, decimals)?;
        config.flash_loan = self.flash_loan;
        config.repay_with_collateral = self.repay_with_collateral;
        Ok(config)
    }
}
