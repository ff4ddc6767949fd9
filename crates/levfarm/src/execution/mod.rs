pub mod gas;
pub mod market;
pub mod simulated;

pub use gas::{BaseFeeSource, StaticBaseFee};
pub use market::{LendingMarket, MarketCapabilities};
pub use simulated::{MarketCall, MarketOp, SimulatedMarket, SimulatedMarketConfig};
