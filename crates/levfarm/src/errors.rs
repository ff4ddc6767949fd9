use alloy::primitives::U256;
use thiserror::Error;

use crate::types::Wad;

/// Typed error hierarchy for the leverage engine.
///
/// Library code returns these directly; the keeper binary wraps them with
/// `anyhow::Context` for propagation.
///
/// Loop budget exhaustion is deliberately absent: it is reported through
/// [`crate::types::LoopOutcome::budget_exhausted`], not raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeverageError {
    // -- Ratio math ---------------------------------------------------------
    #[error("invalid ratio {ratio}: must be below 1.0")]
    InvalidRatio { ratio: Wad },

    #[error("arithmetic overflow in {context}")]
    ArithmeticOverflow { context: &'static str },

    // -- Configuration ------------------------------------------------------
    #[error(
        "parameter ordering violated: need target ({target}) < max borrow ({max_borrow}) \
         < max ({max}) < liquidation threshold ({liquidation_threshold})"
    )]
    ParameterOrderingViolation {
        target: Wad,
        max_borrow: Wad,
        max: Wad,
        liquidation_threshold: Wad,
    },

    #[error("invalid operational limits: {reason}")]
    InvalidLimits { reason: String },

    // -- Position -----------------------------------------------------------
    #[error("position inconsistency: borrows {borrows} exceed deposits {deposits}")]
    PositionInconsistency { deposits: U256, borrows: U256 },

    #[error("insufficient collateral: requested {requested}, available {available}")]
    InsufficientCollateral { requested: U256, available: U256 },

    #[error("position manager is shut down")]
    Shutdown,

    // -- Market -------------------------------------------------------------
    #[error("market error: {reason}")]
    Market { reason: String },

    #[error("market does not support {operation}")]
    Unsupported { operation: &'static str },
}

pub type LeverageResult<T> = Result<T, LeverageError>;
