// 8.0: the margin pool. every mutating call accrues interest, runs the
// liquidation pass, then applies one operation atomically.
// deterministic and event-driven; the venue is the only collaborator.

mod accrual;
mod config;
mod core;
mod deposits;
mod emergency;
mod ledger;
mod liquidations;
mod positions;
mod results;

pub use config::EngineConfig;
pub use core::{AssetLedger, MarginPool, PoolState};
pub use results::{ExecuteOutcome, PoolError, SystemLeverage};
