pub mod outcome;
pub mod position;
pub mod wad;

pub use outcome::{FreeOutcome, HarvestReport, LoopExit, LoopOutcome, ProfitAndLoss};
pub use position::{LeverageMode, Position, PositionSnapshot, ProtocolLimits};
pub use wad::{amount_to_decimal, decimal_to_amount, Wad};
