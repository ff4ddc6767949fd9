pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::types::LeverageMode;

/// Load and merge all config JSON files into a single [`LevfarmConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   strategy.json
///   market.json
///   keeper.json
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                          | Config Field                          |
/// |----------------------------------|---------------------------------------|
/// | `LEVFARM_MAX_ITERATIONS`         | `strategy.limits.max_iterations`      |
/// | `LEVFARM_MAX_TEND_BASEFEE_GWEI`  | `strategy.limits.max_tend_basefee_gwei` |
/// | `LEVFARM_LEVERAGE_MODE`          | `strategy.mode`                       |
/// | `LEVFARM_POLL_INTERVAL_SECONDS`  | `keeper.poll_interval_seconds`        |
/// | `LEVFARM_INITIAL_DEPOSIT`        | `keeper.initial_deposit`              |
pub fn load_config(config_dir: &Path) -> Result<LevfarmConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let app: AppConfig = serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let strategy: StrategyConfig =
        serde_json::from_str(&read("strategy.json")?).context("parsing strategy.json")?;

    let market: MarketConfig =
        serde_json::from_str(&read("market.json")?).context("parsing market.json")?;

    let keeper: KeeperConfig =
        serde_json::from_str(&read("keeper.json")?).context("parsing keeper.json")?;

    let mut config = LevfarmConfig {
        app,
        strategy,
        market,
        keeper,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Only non-empty env vars take effect. Parse failures are skipped and the
/// JSON value remains.
fn apply_env_overrides(config: &mut LevfarmConfig) {
    // -- Strategy ------------------------------------------------------------
    if let Some(val) = env_parse::<u8>("LEVFARM_MAX_ITERATIONS") {
        info!(val, "env override: LEVFARM_MAX_ITERATIONS");
        config.strategy.limits.max_iterations = val;
    }

    if let Some(val) = env_parse::<u64>("LEVFARM_MAX_TEND_BASEFEE_GWEI") {
        info!(val, "env override: LEVFARM_MAX_TEND_BASEFEE_GWEI");
        config.strategy.limits.max_tend_basefee_gwei = val;
    }

    if let Some(val) = env_parse::<LeverageMode>("LEVFARM_LEVERAGE_MODE") {
        info!(mode = %val, "env override: LEVFARM_LEVERAGE_MODE");
        config.strategy.mode = val;
    }

    // -- Keeper --------------------------------------------------------------
    if let Some(val) = env_parse::<u64>("LEVFARM_POLL_INTERVAL_SECONDS") {
        info!(val, "env override: LEVFARM_POLL_INTERVAL_SECONDS");
        config.keeper.poll_interval_seconds = val;
    }

    if let Some(val) = env_decimal("LEVFARM_INITIAL_DEPOSIT") {
        info!(%val, "env override: LEVFARM_INITIAL_DEPOSIT");
        config.keeper.initial_deposit = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(&v).ok())
}
