//! Leveraged lending position manager.
//!
//! Keeps a single-asset lending position at a target loan-to-value ratio by
//! looping deposit/borrow (lever up) and withdraw/repay (lever down) against
//! a [`execution::LendingMarket`], with a pure tend trigger deciding when a
//! keeper should rebalance.

pub mod config;
pub mod constants;
pub mod core;
pub mod errors;
pub mod execution;
pub mod logging;
pub mod types;
