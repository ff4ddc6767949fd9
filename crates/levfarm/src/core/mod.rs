pub mod keeper;
pub mod lever_down;
pub mod lever_up;
pub mod ltv_math;
pub mod oracle;
pub mod params;
pub mod position_manager;
pub mod tend;

pub use keeper::{Keeper, KeeperSettings};
pub use lever_down::{lever_down, withdraw_excess, Unwind};
pub use lever_up::lever_up;
pub use params::{LeverageParams, OperationalLimits, SafetyMargins};
pub use position_manager::PositionManager;
pub use tend::{TendDecision, TendInputs, TendReason};
