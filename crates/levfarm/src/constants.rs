use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Numeric Constants
// ---------------------------------------------------------------------------

/// WAD: 1e18, the fixed-point scale for every ratio (LTV, margins, hysteresis band).
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// WAD as a `Decimal`, for config parsing and log output.
pub const WAD_DECIMAL: Decimal = dec!(1_000_000_000_000_000_000);

/// Basis-point denominator.
pub const MAX_BPS: u32 = 10_000;

// ---------------------------------------------------------------------------
// Default Operational Limits
// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_ITERATIONS: u8 = 12;
pub const DEFAULT_MAX_TEND_BASEFEE_GWEI: u64 = 30;

/// Share of unrealized reward value counted in `estimated_total_assets`.
pub const DEFAULT_REWARD_HAIRCUT_BPS: u32 = 9_000;

/// Hysteresis band around the target LTV: 0.5%.
pub const DEFAULT_MIN_ADJUST_RATIO: Decimal = dec!(0.005);

// ---------------------------------------------------------------------------
// Default Safety Margins (auto-derivation from protocol limits)
// ---------------------------------------------------------------------------

/// `max_borrow_ltv = protocol max borrow ratio - margin`.
pub const DEFAULT_MAX_BORROW_MARGIN: Decimal = dec!(0.005);

/// `target_ltv = max_borrow_ltv - margin`.
pub const DEFAULT_TARGET_MARGIN: Decimal = dec!(0.02);

/// `max_ltv = liquidation threshold - margin`.
pub const DEFAULT_MAX_LTV_MARGIN: Decimal = dec!(0.005);

// ---------------------------------------------------------------------------
// Keeper
// ---------------------------------------------------------------------------

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 15;

/// Consecutive tend failures before the keeper shuts the position down.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
