use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::LeverageResult;

/// Source of the current base fee, in gwei, for the tend gas ceiling.
pub trait BaseFeeSource: Send + Sync {
    fn base_fee_gwei(&self) -> LeverageResult<u64>;
}

/// Base fee held in memory; the keeper binary and tests set it directly.
#[derive(Debug, Default)]
pub struct StaticBaseFee(AtomicU64);

impl StaticBaseFee {
    pub fn new(gwei: u64) -> Self {
        Self(AtomicU64::new(gwei))
    }

    pub fn set(&self, gwei: u64) {
        self.0.store(gwei, Ordering::Relaxed);
    }
}

impl BaseFeeSource for StaticBaseFee {
    fn base_fee_gwei(&self) -> LeverageResult<u64> {
        Ok(self.0.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_base_fee_set() {
        let fee = StaticBaseFee::new(12);
        assert_eq!(fee.base_fee_gwei().unwrap(), 12);
        fee.set(80);
        assert_eq!(fee.base_fee_gwei().unwrap(), 80);
    }
}
